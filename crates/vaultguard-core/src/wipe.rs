//! Best-effort destruction of persisted vault state
//!
//! Every deletion is attempted independently. Failures are logged and
//! collected, never raised, and never stop the process from terminating
//! afterwards.

use crate::store::StatePaths;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// Exit status after a wipe
pub const WIPE_EXIT_CODE: i32 = 0;

/// Ends the process
pub trait Terminator: Send + Sync {
    /// Terminate with `code`; never returns
    fn terminate(&self, code: i32) -> !;
}

/// Real process exit
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExit;

impl Terminator for ProcessExit {
    fn terminate(&self, code: i32) -> ! {
        std::process::exit(code)
    }
}

/// Filesystem deletion primitives
pub trait FileRemover: Send + Sync {
    /// Remove a file or symlink
    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Remove an empty directory
    fn remove_dir(&self, path: &Path) -> io::Result<()>;
}

/// [`FileRemover`] over `std::fs`
#[derive(Debug, Default, Clone, Copy)]
pub struct FsRemover;

impl FileRemover for FsRemover {
    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir(path)
    }
}

/// Outcome of a wipe pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WipeReport {
    /// Paths removed
    pub deleted: Vec<PathBuf>,
    /// Paths that could not be removed, with the reason
    pub failures: Vec<(PathBuf, String)>,
}

/// Deletes every state root recursively, then the well-known files
pub struct WipeExecutor {
    roots: Vec<PathBuf>,
    well_known: Vec<PathBuf>,
    remover: Arc<dyn FileRemover>,
    terminator: Arc<dyn Terminator>,
}

impl WipeExecutor {
    /// Targets from the storage collaborator, real filesystem, real exit
    pub fn new(paths: &dyn StatePaths) -> Self {
        Self {
            roots: paths.list_state_paths(),
            well_known: paths.well_known_files(),
            remover: Arc::new(FsRemover),
            terminator: Arc::new(ProcessExit),
        }
    }

    /// Replace the deletion primitives
    pub fn with_remover(mut self, remover: Arc<dyn FileRemover>) -> Self {
        self.remover = remover;
        self
    }

    /// Replace process termination
    pub fn with_terminator(mut self, terminator: Arc<dyn Terminator>) -> Self {
        self.terminator = terminator;
        self
    }

    /// Delete everything reachable, deepest paths first. Never fails.
    pub fn wipe(&self) -> WipeReport {
        let mut report = WipeReport::default();
        tracing::warn!("Wiping vault state ({} roots)", self.roots.len());

        for root in &self.roots {
            if std::fs::symlink_metadata(root).is_err() {
                tracing::debug!("Wipe root absent: {}", root.display());
                continue;
            }
            tracing::info!("Deleting tree: {}", root.display());

            for entry in WalkDir::new(root).contents_first(true) {
                match entry {
                    Ok(entry) => {
                        let result = if entry.file_type().is_dir() {
                            self.remover.remove_dir(entry.path())
                        } else {
                            self.remover.remove_file(entry.path())
                        };
                        record(&mut report, entry.path(), result);
                    }
                    Err(e) => {
                        let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                        tracing::warn!("Cannot walk {}: {}", path.display(), e);
                        report.failures.push((path, e.to_string()));
                    }
                }
            }
        }

        for file in &self.well_known {
            record(&mut report, file, self.remover.remove_file(file));
        }

        tracing::warn!(
            "Wipe complete: {} deleted, {} failed",
            report.deleted.len(),
            report.failures.len()
        );
        report
    }

    /// Wipe, then terminate the process
    pub fn wipe_and_exit(&self) -> ! {
        let _ = self.wipe();
        self.terminator.terminate(WIPE_EXIT_CODE)
    }
}

fn record(report: &mut WipeReport, path: &Path, result: io::Result<()>) {
    match result {
        Ok(()) => {
            tracing::info!("Deleted: {}", path.display());
            report.deleted.push(path.to_path_buf());
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!("Failed to delete {}: {}", path.display(), e);
            report.failures.push((path.to_path_buf(), e.to_string()));
        }
    }
}
