//! Error types

use rusqlite::ErrorCode;
use vaultguard_core::StorageError;

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Stored value could not be interpreted
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this is SQLite contention (`SQLITE_BUSY` / `SQLITE_LOCKED`)
    pub fn is_busy(&self) -> bool {
        matches!(self, Error::Database(e) if is_busy_error(e))
    }
}

/// Check if error is SQLITE_BUSY or SQLITE_LOCKED
pub fn is_busy_error(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked)
    )
}

impl From<Error> for StorageError {
    fn from(err: Error) -> Self {
        match err {
            Error::Database(ref e) if is_busy_error(e) => StorageError::Busy(err.to_string()),
            Error::Database(rusqlite::Error::QueryReturnedNoRows) => StorageError::NotFound(err.to_string()),
            Error::NotFound(msg) => StorageError::NotFound(msg),
            other => StorageError::Backend(other.to_string()),
        }
    }
}
