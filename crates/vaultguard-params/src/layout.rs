//! Persisted-state layout
//!
//! The storage collaborator owns where things live on disk. The wipe path
//! only needs to know the roots and a fallback list of well-known files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// On-disk layout of the vault's persisted state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateLayout {
    /// Directory holding every vault file (relative paths resolve against the working directory)
    pub data_dir: PathBuf,
    /// SQLite database file name inside `data_dir`
    pub database_file: String,
    /// Attempt counter file name inside `data_dir`
    pub attempts_file: String,
    /// File names deleted directly if the recursive walk is partial
    pub well_known_files: Vec<String>,
}

impl Default for StateLayout {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            database_file: "vault.db".to_string(),
            attempts_file: "attempts.cfg".to_string(),
            well_known_files: vec![
                "entries.vault".to_string(),
                "decoy.vault".to_string(),
                "realData.sfs".to_string(),
                "fakeData.sfs".to_string(),
                "pin.cfg".to_string(),
                "attempts.cfg".to_string(),
                "vault.db".to_string(),
                "vault.db-wal".to_string(),
                "vault.db-shm".to_string(),
            ],
        }
    }
}

impl StateLayout {
    /// Layout rooted at `data_dir` with default file names
    pub fn with_data_dir<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Path of the SQLite database
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }

    /// Path of the attempt counter file
    pub fn attempts_path(&self) -> PathBuf {
        self.data_dir.join(&self.attempts_file)
    }

    /// Candidate state roots.
    ///
    /// A relative `data_dir` is returned both as-is and joined onto the
    /// current working directory, so a wipe still finds the data when the
    /// two disagree. Duplicates are removed, order is preserved.
    pub fn candidate_roots(&self) -> Vec<PathBuf> {
        let mut roots = vec![self.data_dir.clone()];
        if self.data_dir.is_relative() {
            if let Ok(cwd) = std::env::current_dir() {
                roots.push(cwd.join(&self.data_dir));
            }
        }
        roots.dedup();
        roots
    }

    /// Every well-known file under every candidate root
    pub fn well_known_paths(&self) -> Vec<PathBuf> {
        self.candidate_roots()
            .iter()
            .flat_map(|root| self.well_known_files.iter().map(move |f| root.join(f)))
            .collect()
    }
}
