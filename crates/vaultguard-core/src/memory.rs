//! In-memory store for tests and embedding
//!
//! Implements every storage seam over plain collections. Faults can be queued
//! per operation so contention and failure paths can be driven
//! deterministically.

use crate::model::{Account, Event, EventFilter, EventType, NewAccount, NewEvent};
use crate::store::{AttemptCounter, CredentialStore, EventLog, StatePaths};
use crate::{StorageError, StorageResult};
use chrono::{DateTime, Local, Timelike, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

/// Storage operation a fault can be attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// `get_account` / `get_account_by_id` / `account_count`
    ReadAccount,
    /// `insert_account`
    InsertAccount,
    /// `update_account`
    UpdateAccount,
    /// `locked_until`
    ReadLock,
    /// `set_locked_until`
    WriteLock,
    /// `append_event`
    AppendEvent,
    /// `count_events` / `top_login_hour` / `recent_events`
    QueryEvents,
    /// `get_attempt_counter`
    ReadCounter,
    /// `set_attempt_counter`
    WriteCounter,
}

#[derive(Default)]
struct Inner {
    accounts: Vec<Account>,
    events: Vec<Event>,
    attempts: u32,
    faults: HashMap<StoreOp, VecDeque<StorageError>>,
    credential_writes: u64,
    lock_writes: Vec<(i64, Option<DateTime<Utc>>)>,
}

impl Inner {
    fn check(&mut self, op: StoreOp) -> StorageResult<()> {
        match self.faults.get_mut(&op).and_then(|q| q.pop_front()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn account_mut(&mut self, id: i64) -> StorageResult<&mut Account> {
        self.accounts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| StorageError::NotFound(format!("account {}", id)))
    }
}

/// In-memory [`VaultStore`](crate::VaultStore)
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    state_roots: Vec<PathBuf>,
    well_known: Vec<PathBuf>,
}

impl MemoryStore {
    /// Empty store with no on-disk state
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty store whose wipe targets are the given roots and files
    pub fn with_state_paths(roots: Vec<PathBuf>, well_known: Vec<PathBuf>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            state_roots: roots,
            well_known,
        }
    }

    /// Fail the next call of `op` with `err`. Faults queue in order.
    pub fn push_fault(&self, op: StoreOp, err: StorageError) {
        self.inner.lock().faults.entry(op).or_default().push_back(err);
    }

    /// Append an event with an explicit timestamp
    pub fn insert_event_at(
        &self,
        owner_id: Option<i64>,
        event_type: EventType,
        created_at: DateTime<Utc>,
    ) -> i64 {
        let mut inner = self.inner.lock();
        let id = inner.events.len() as i64 + 1;
        inner.events.push(Event {
            id,
            owner_id,
            event_type,
            metadata: None,
            created_at,
        });
        id
    }

    /// Number of successful `update_account` writes
    pub fn credential_writes(&self) -> u64 {
        self.inner.lock().credential_writes
    }

    /// Successful lock writes, in the order they were applied
    pub fn lock_writes(&self) -> Vec<(i64, Option<DateTime<Utc>>)> {
        self.inner.lock().lock_writes.clone()
    }

    /// Snapshot of all events, oldest first
    pub fn events(&self) -> Vec<Event> {
        self.inner.lock().events.clone()
    }
}

impl CredentialStore for MemoryStore {
    fn get_account(&self, username: &str) -> StorageResult<Option<Account>> {
        let mut inner = self.inner.lock();
        inner.check(StoreOp::ReadAccount)?;
        Ok(inner.accounts.iter().find(|a| a.username == username).cloned())
    }

    fn get_account_by_id(&self, id: i64) -> StorageResult<Option<Account>> {
        let mut inner = self.inner.lock();
        inner.check(StoreOp::ReadAccount)?;
        Ok(inner.accounts.iter().find(|a| a.id == id).cloned())
    }

    fn account_count(&self) -> StorageResult<u64> {
        let mut inner = self.inner.lock();
        inner.check(StoreOp::ReadAccount)?;
        Ok(inner.accounts.len() as u64)
    }

    fn insert_account(&self, account: &NewAccount) -> StorageResult<i64> {
        let mut inner = self.inner.lock();
        inner.check(StoreOp::InsertAccount)?;
        if inner.accounts.iter().any(|a| a.username == account.username) {
            return Err(StorageError::Backend(format!(
                "username already exists: {}",
                account.username
            )));
        }
        let id = inner.accounts.iter().map(|a| a.id).max().unwrap_or(0) + 1;
        inner.accounts.push(Account {
            id,
            username: account.username.clone(),
            credential_hash: account.credential_hash.clone(),
            salt: account.salt.clone(),
            locked_until: None,
        });
        Ok(id)
    }

    fn update_account(&self, account: &Account) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        inner.check(StoreOp::UpdateAccount)?;
        let stored = inner.account_mut(account.id)?;
        stored.credential_hash = account.credential_hash.clone();
        stored.salt = account.salt.clone();
        inner.credential_writes += 1;
        Ok(())
    }

    fn set_locked_until(&self, id: i64, until: Option<DateTime<Utc>>) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        inner.check(StoreOp::WriteLock)?;
        inner.account_mut(id)?.locked_until = until;
        inner.lock_writes.push((id, until));
        Ok(())
    }

    fn locked_until(&self, id: i64) -> StorageResult<Option<DateTime<Utc>>> {
        let mut inner = self.inner.lock();
        inner.check(StoreOp::ReadLock)?;
        Ok(inner.account_mut(id)?.locked_until)
    }
}

impl EventLog for MemoryStore {
    fn append_event(&self, event: &NewEvent) -> StorageResult<i64> {
        let mut inner = self.inner.lock();
        inner.check(StoreOp::AppendEvent)?;
        let id = inner.events.len() as i64 + 1;
        inner.events.push(Event {
            id,
            owner_id: event.owner_id,
            event_type: event.event_type,
            metadata: event.metadata.clone(),
            created_at: event.created_at,
        });
        Ok(id)
    }

    fn count_events(&self, filter: &EventFilter) -> StorageResult<u64> {
        let mut inner = self.inner.lock();
        inner.check(StoreOp::QueryEvents)?;
        Ok(inner.events.iter().filter(|e| filter.matches(e)).count() as u64)
    }

    fn top_login_hour(&self, owner_id: i64) -> StorageResult<Option<u32>> {
        let mut inner = self.inner.lock();
        inner.check(StoreOp::QueryEvents)?;

        let mut histogram = [0u64; 24];
        for event in inner
            .events
            .iter()
            .filter(|e| e.owner_id == Some(owner_id) && e.event_type == EventType::LoginSuccess)
        {
            histogram[event.created_at.with_timezone(&Local).hour() as usize] += 1;
        }

        let mut top: Option<(u32, u64)> = None;
        for (hour, count) in histogram.iter().enumerate() {
            if *count > 0 && top.map_or(true, |(_, best)| *count > best) {
                top = Some((hour as u32, *count));
            }
        }
        Ok(top.map(|(hour, _)| hour))
    }

    fn recent_events(&self, limit: usize) -> StorageResult<Vec<Event>> {
        let mut inner = self.inner.lock();
        inner.check(StoreOp::QueryEvents)?;
        let mut events = inner.events.clone();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        events.truncate(limit);
        Ok(events)
    }
}

impl AttemptCounter for MemoryStore {
    fn get_attempt_counter(&self) -> StorageResult<u32> {
        let mut inner = self.inner.lock();
        inner.check(StoreOp::ReadCounter)?;
        Ok(inner.attempts)
    }

    fn set_attempt_counter(&self, value: u32) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        inner.check(StoreOp::WriteCounter)?;
        inner.attempts = value;
        Ok(())
    }
}

impl StatePaths for MemoryStore {
    fn list_state_paths(&self) -> Vec<PathBuf> {
        self.state_roots.clone()
    }

    fn well_known_files(&self) -> Vec<PathBuf> {
        self.well_known.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn local_at_hour(hour: u32) -> DateTime<Utc> {
        Local
            .with_ymd_and_hms(2024, 3, 14, hour, 15, 0)
            .earliest()
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_faults_are_consumed_in_order() {
        let store = MemoryStore::new();
        store.push_fault(StoreOp::ReadCounter, StorageError::Busy("busy".into()));
        store.push_fault(StoreOp::ReadCounter, StorageError::Backend("io".into()));

        assert_eq!(store.get_attempt_counter(), Err(StorageError::Busy("busy".into())));
        assert_eq!(store.get_attempt_counter(), Err(StorageError::Backend("io".into())));
        assert_eq!(store.get_attempt_counter(), Ok(0));
        // other operations unaffected
        assert!(store.set_attempt_counter(2).is_ok());
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let store = MemoryStore::new();
        let account = NewAccount {
            username: "owner".into(),
            credential_hash: "x".into(),
            salt: None,
        };
        assert_eq!(store.insert_account(&account), Ok(1));
        assert!(store.insert_account(&account).is_err());
        assert_eq!(store.account_count(), Ok(1));
    }

    #[test]
    fn test_top_login_hour_histogram() {
        let store = MemoryStore::new();
        assert_eq!(store.top_login_hour(1), Ok(None));

        for _ in 0..3 {
            store.insert_event_at(Some(1), EventType::LoginSuccess, local_at_hour(9));
        }
        store.insert_event_at(Some(1), EventType::LoginSuccess, local_at_hour(20));
        // other owners and failures do not count
        for _ in 0..5 {
            store.insert_event_at(Some(2), EventType::LoginSuccess, local_at_hour(3));
            store.insert_event_at(Some(1), EventType::LoginFailed, local_at_hour(3));
        }
        assert_eq!(store.top_login_hour(1), Ok(Some(9)));
    }

    #[test]
    fn test_top_login_hour_tie_goes_to_earliest() {
        let store = MemoryStore::new();
        store.insert_event_at(Some(1), EventType::LoginSuccess, local_at_hour(18));
        store.insert_event_at(Some(1), EventType::LoginSuccess, local_at_hour(7));
        assert_eq!(store.top_login_hour(1), Ok(Some(7)));
    }

    #[test]
    fn test_recent_events_newest_first() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.insert_event_at(None, EventType::LoginFailed, now - chrono::Duration::minutes(2));
        store.insert_event_at(Some(1), EventType::LoginSuccess, now);
        store.insert_event_at(Some(1), EventType::EditEntry, now - chrono::Duration::minutes(1));

        let recent = store.recent_events(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].event_type, EventType::LoginSuccess);
        assert_eq!(recent[1].event_type, EventType::EditEntry);
    }
}
