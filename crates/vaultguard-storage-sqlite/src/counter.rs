//! Failed-attempt counter persisted in its own file
//!
//! The counter lives outside the database so it survives a database that
//! cannot be opened, and so a wipe that removes the database also resets it.
//! The file holds a single decimal integer.

use crate::{Error, Result};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Counter stored as text at a fixed path
#[derive(Debug, Clone)]
pub struct FileAttemptCounter {
    path: PathBuf,
}

impl FileAttemptCounter {
    /// Counter backed by `path`. Nothing is touched until the first write.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current value; a missing file reads as zero
    pub fn load(&self) -> Result<u32> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(0);
        }
        trimmed
            .parse::<u32>()
            .map_err(|_| Error::Corrupt(format!("attempt counter {}", self.path.display())))
    }

    /// Replace the value. Written to a sibling temp file and renamed into place.
    pub fn store(&self, value: u32) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(value.to_string().as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        tracing::debug!("Attempt counter set to {}", value);
        Ok(())
    }
}
