//! SQLite-backed implementation of the core storage traits

use crate::accounts::AccountStorage;
use crate::counter::FileAttemptCounter;
use crate::events::EventStorage;
use crate::{Database, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::path::PathBuf;
use vaultguard_core::{
    Account, AttemptCounter, CredentialStore, Event, EventFilter, EventLog, NewAccount, NewEvent,
    StatePaths, StorageResult,
};
use vaultguard_params::StateLayout;

/// Vault state on disk: one SQLite database plus the attempt counter file.
///
/// The connection is shared behind a mutex so the lock scheduler thread and
/// callers never use it concurrently. Cross-process contention still surfaces
/// as `StorageError::Busy` once SQLite's own busy timeout runs out.
pub struct SqliteVaultStore {
    db: Mutex<Database>,
    counter: FileAttemptCounter,
    layout: StateLayout,
}

impl SqliteVaultStore {
    /// Open the database and counter described by `layout`
    pub fn open(layout: &StateLayout) -> Result<Self> {
        let db = Database::open(layout.database_path())?;
        tracing::info!("Vault storage opened under {}", layout.data_dir.display());
        Ok(Self::with_database(db, layout))
    }

    /// Use an already opened database; the counter still follows `layout`
    pub fn with_database(db: Database, layout: &StateLayout) -> Self {
        Self {
            db: Mutex::new(db),
            counter: FileAttemptCounter::new(layout.attempts_path()),
            layout: layout.clone(),
        }
    }

    /// Layout this store was opened with
    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    fn with_db<T>(&self, f: impl FnOnce(&Database) -> Result<T>) -> StorageResult<T> {
        let db = self.db.lock();
        f(&db).map_err(Into::into)
    }
}

impl CredentialStore for SqliteVaultStore {
    fn get_account(&self, username: &str) -> StorageResult<Option<Account>> {
        self.with_db(|db| AccountStorage::new(db).get_by_username(username))
    }

    fn get_account_by_id(&self, id: i64) -> StorageResult<Option<Account>> {
        self.with_db(|db| AccountStorage::new(db).get_by_id(id))
    }

    fn account_count(&self) -> StorageResult<u64> {
        self.with_db(|db| AccountStorage::new(db).count())
    }

    fn insert_account(&self, account: &NewAccount) -> StorageResult<i64> {
        self.with_db(|db| AccountStorage::new(db).insert(account))
    }

    fn update_account(&self, account: &Account) -> StorageResult<()> {
        self.with_db(|db| AccountStorage::new(db).update_credentials(account))
    }

    fn set_locked_until(&self, id: i64, until: Option<DateTime<Utc>>) -> StorageResult<()> {
        self.with_db(|db| AccountStorage::new(db).set_locked_until(id, until))
    }

    fn locked_until(&self, id: i64) -> StorageResult<Option<DateTime<Utc>>> {
        self.with_db(|db| AccountStorage::new(db).locked_until(id))
    }
}

impl EventLog for SqliteVaultStore {
    fn append_event(&self, event: &NewEvent) -> StorageResult<i64> {
        self.with_db(|db| EventStorage::new(db).append(event))
    }

    fn count_events(&self, filter: &EventFilter) -> StorageResult<u64> {
        self.with_db(|db| EventStorage::new(db).count(filter))
    }

    fn top_login_hour(&self, owner_id: i64) -> StorageResult<Option<u32>> {
        self.with_db(|db| EventStorage::new(db).top_login_hour(owner_id))
    }

    fn recent_events(&self, limit: usize) -> StorageResult<Vec<Event>> {
        self.with_db(|db| EventStorage::new(db).recent(limit))
    }
}

impl AttemptCounter for SqliteVaultStore {
    fn get_attempt_counter(&self) -> StorageResult<u32> {
        self.counter.load().map_err(Into::into)
    }

    fn set_attempt_counter(&self, value: u32) -> StorageResult<()> {
        self.counter.store(value).map_err(Into::into)
    }
}

impl StatePaths for SqliteVaultStore {
    fn list_state_paths(&self) -> Vec<PathBuf> {
        self.layout.candidate_roots()
    }

    fn well_known_files(&self) -> Vec<PathBuf> {
        self.layout.well_known_paths()
    }
}
