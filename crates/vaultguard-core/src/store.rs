//! Storage seams
//!
//! The core never owns a database handle. Each component receives the slice
//! of storage it needs at construction; the process bootstrap decides the
//! implementation and its lifetime.

use crate::model::{Account, Event, EventFilter, NewAccount, NewEvent};
use crate::StorageResult;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Account records
pub trait CredentialStore: Send + Sync {
    /// Look up an account by username
    fn get_account(&self, username: &str) -> StorageResult<Option<Account>>;

    /// Look up an account by id
    fn get_account_by_id(&self, id: i64) -> StorageResult<Option<Account>>;

    /// Number of provisioned accounts
    fn account_count(&self) -> StorageResult<u64>;

    /// Insert a new account, returning its id
    fn insert_account(&self, account: &NewAccount) -> StorageResult<i64>;

    /// Persist `credential_hash` and `salt` of an existing account in one
    /// write. `locked_until` is left untouched.
    fn update_account(&self, account: &Account) -> StorageResult<()>;

    /// Set or clear the lock deadline
    fn set_locked_until(&self, id: i64, until: Option<DateTime<Utc>>) -> StorageResult<()>;

    /// Current lock deadline
    fn locked_until(&self, id: i64) -> StorageResult<Option<DateTime<Utc>>>;
}

/// Append-only event log
pub trait EventLog: Send + Sync {
    /// Append an event, returning its id
    fn append_event(&self, event: &NewEvent) -> StorageResult<i64>;

    /// Count events matching `filter`
    fn count_events(&self, filter: &EventFilter) -> StorageResult<u64>;

    /// Local hour of day (0-23) with the most `LOGIN_SUCCESS` events for the
    /// owner; ties go to the earliest hour. `None` without history.
    fn top_login_hour(&self, owner_id: i64) -> StorageResult<Option<u32>>;

    /// Newest events first
    fn recent_events(&self, limit: usize) -> StorageResult<Vec<Event>>;
}

/// Process-wide consecutive failure counter
pub trait AttemptCounter: Send + Sync {
    /// Read the counter; a missing counter reads as 0
    fn get_attempt_counter(&self) -> StorageResult<u32>;

    /// Overwrite the counter
    fn set_attempt_counter(&self, value: u32) -> StorageResult<()>;
}

/// Locations of persisted vault state, for the wipe
pub trait StatePaths: Send + Sync {
    /// Directories to wipe recursively
    fn list_state_paths(&self) -> Vec<PathBuf>;

    /// Individual files to delete even if the directory walk misses them
    fn well_known_files(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}

/// Everything the vault needs from its storage collaborator
pub trait VaultStore: CredentialStore + EventLog + AttemptCounter + StatePaths {}

impl<T> VaultStore for T where T: CredentialStore + EventLog + AttemptCounter + StatePaths {}
