//! Vaultguard policy parameters and persisted-state layout
//!
//! This crate provides the thresholds used by the anomaly and duress
//! components, the retry schedule for lock persistence, the on-disk layout
//! of the vault's state, and JSON configuration loading.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod layout;
pub mod policy;

pub use config::VaultConfig;
pub use layout::StateLayout;
pub use policy::{
    AnomalyPolicy, DuressPolicy, LockPolicy, KDF_ITERATIONS, KEY_LEN, SALT_LEN,
};

/// Error types for parameter operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Config file could not be read
    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON for [`VaultConfig`]
    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A parameter is out of range
    #[error("Invalid parameter: {0}")]
    Invalid(String),
}

/// Result type for parameter operations
pub type Result<T> = std::result::Result<T, Error>;
