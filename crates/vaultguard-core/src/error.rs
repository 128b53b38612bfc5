//! Error types
//!
//! Storage implementations classify their failures into [`StorageError`] so
//! callers branch on meaning (contention vs. everything else) instead of on
//! message text.

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Result type at the storage boundary
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Classified storage failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Contention ("busy"/"locked"); safe to retry
    #[error("Storage busy: {0}")]
    Busy(String),

    /// Record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other failure; retrying will not help
    #[error("Storage error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Whether the failure is transient contention
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Busy(_))
    }
}

/// Core errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Storage failure (already classified)
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Key derivation failed
    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    /// Stored credential material is malformed
    #[error("Invalid credential material: {0}")]
    InvalidCredential(String),

    /// Input rejected
    #[error("Validation error: {0}")]
    Validation(String),

    /// Background lock writer is no longer accepting work
    #[error("Lock scheduler closed: {0}")]
    SchedulerClosed(String),
}

impl Error {
    /// Whether the underlying cause is transient storage contention
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_transient())
    }
}
