//! SQLite storage for the vault
//!
//! Implements the `vaultguard-core` storage traits over a single SQLite
//! database in WAL mode, plus a plain-file attempt counter next to it.
//!
//! ## Schema
//!
//! - **users**: username, credential hash, per-user salt (absent for legacy
//!   rows), lock deadline
//! - **events**: append-only audit log keyed by optional owner
//!
//! Databases written by older installs are migrated in place: missing
//! columns are added, text-encoded salts and timestamps are read as-is.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod accounts;
pub mod counter;
pub mod database;
pub mod error;
pub mod events;
pub mod migrations;
pub mod store;
pub mod timestamp;

pub use accounts::AccountStorage;
pub use counter::FileAttemptCounter;
pub use database::{Database, BUSY_TIMEOUT};
pub use error::{is_busy_error, Error, Result};
pub use events::EventStorage;
pub use migrations::SCHEMA_VERSION;
pub use store::SqliteVaultStore;
