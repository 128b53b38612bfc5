//! Background lock writer
//!
//! One worker thread owns every write to `locked_until`. Submissions go
//! through a FIFO channel, so lock decisions for an account are applied in
//! the order they were made. Writes that hit contention are retried per the
//! [`LockPolicy`] schedule; anything else is logged and dropped, since the
//! caller has already moved on.

use crate::retry::with_busy_retry;
use crate::store::CredentialStore;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use vaultguard_params::LockPolicy;

enum Command {
    Apply {
        owner_id: i64,
        until: Option<DateTime<Utc>>,
    },
    Flush(Sender<()>),
}

struct Worker {
    sender: Sender<Command>,
    handle: JoinHandle<()>,
    done: Receiver<()>,
    abandon: Arc<AtomicBool>,
}

/// Asynchronous lock persistence with a synchronous, fail-open lock check
pub struct LockScheduler {
    accounts: Arc<dyn CredentialStore>,
    policy: LockPolicy,
    worker: Mutex<Option<Worker>>,
}

impl LockScheduler {
    /// Start the worker thread
    pub fn start(accounts: Arc<dyn CredentialStore>, policy: LockPolicy) -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<Command>();
        let (done_tx, done) = mpsc::channel::<()>();
        let abandon = Arc::new(AtomicBool::new(false));

        let worker_accounts = accounts.clone();
        let worker_policy = policy.clone();
        let worker_abandon = abandon.clone();
        let handle = thread::Builder::new()
            .name("vaultguard-lock".to_string())
            .spawn(move || {
                for command in receiver {
                    if worker_abandon.load(Ordering::SeqCst) {
                        break;
                    }
                    match command {
                        Command::Apply { owner_id, until } => {
                            apply(worker_accounts.as_ref(), &worker_policy, owner_id, until)
                        }
                        Command::Flush(ack) => {
                            let _ = ack.send(());
                        }
                    }
                }
                let _ = done_tx.send(());
            })
            .map_err(|e| Error::SchedulerClosed(format!("failed to start lock worker: {}", e)))?;

        Ok(Self {
            accounts,
            policy,
            worker: Mutex::new(Some(Worker {
                sender,
                handle,
                done,
                abandon,
            })),
        })
    }

    /// Queue a lock decision and return immediately.
    ///
    /// `minutes <= 0` clears the lock; otherwise the account is locked until
    /// now + `minutes`, measured from this call. Owner ids `<= 0` never name
    /// an account and are ignored.
    pub fn schedule_lock(&self, owner_id: i64, minutes: i64) -> Result<()> {
        if owner_id <= 0 {
            tracing::debug!("Ignoring lock update for owner {}", owner_id);
            return Ok(());
        }

        let until = if minutes <= 0 {
            None
        } else {
            let delta = chrono::Duration::try_minutes(minutes)
                .ok_or_else(|| Error::Validation(format!("lock duration out of range: {} minutes", minutes)))?;
            Some(
                Utc::now()
                    .checked_add_signed(delta)
                    .ok_or_else(|| Error::Validation(format!("lock duration out of range: {} minutes", minutes)))?,
            )
        };

        self.send(Command::Apply { owner_id, until })?;
        tracing::debug!("Queued lock update for owner {} ({} minutes)", owner_id, minutes);
        Ok(())
    }

    /// Whether the account is locked right now. Read failures count as
    /// unlocked so a storage hiccup never locks out the owner.
    pub fn is_locked(&self, owner_id: i64) -> bool {
        if owner_id <= 0 {
            return false;
        }
        match self.accounts.locked_until(owner_id) {
            Ok(Some(until)) => until > Utc::now(),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!("Lock check for owner {} failed, treating as unlocked: {}", owner_id, e);
                false
            }
        }
    }

    /// Raw lock deadline, for display
    pub fn locked_until(&self, owner_id: i64) -> Result<Option<DateTime<Utc>>> {
        Ok(self.accounts.locked_until(owner_id)?)
    }

    /// Block until everything queued before this call has been applied, or
    /// `timeout` elapses. Returns whether the queue caught up.
    pub fn flush(&self, timeout: Duration) -> bool {
        let (ack_tx, ack_rx) = mpsc::channel();
        if self.send(Command::Flush(ack_tx)).is_err() {
            return false;
        }
        ack_rx.recv_timeout(timeout).is_ok()
    }

    /// Stop accepting work and give the worker `grace` to drain the queue.
    /// Whatever is still queued after that is abandoned. Returns whether the
    /// queue drained in time. Later calls are no-ops returning `true`.
    pub fn shutdown(&self, grace: Duration) -> bool {
        let Some(worker) = self.worker.lock().take() else {
            return true;
        };
        let Worker {
            sender,
            handle,
            done,
            abandon,
        } = worker;

        // closing the channel ends the worker loop once the backlog is applied
        drop(sender);

        match done.recv_timeout(grace) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    tracing::error!("Lock worker panicked");
                }
                tracing::debug!("Lock scheduler drained");
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                abandon.store(true, Ordering::SeqCst);
                tracing::warn!(
                    "Lock scheduler did not drain within {}ms, abandoning queued writes",
                    grace.as_millis()
                );
                false
            }
        }
    }

    fn send(&self, command: Command) -> Result<()> {
        let guard = self.worker.lock();
        let worker = guard
            .as_ref()
            .ok_or_else(|| Error::SchedulerClosed("lock scheduler is shut down".to_string()))?;
        worker
            .sender
            .send(command)
            .map_err(|_| Error::SchedulerClosed("lock worker exited".to_string()))
    }
}

impl Drop for LockScheduler {
    fn drop(&mut self) {
        self.shutdown(self.policy.shutdown_grace());
    }
}

fn apply(accounts: &dyn CredentialStore, policy: &LockPolicy, owner_id: i64, until: Option<DateTime<Utc>>) {
    match with_busy_retry(policy, "lock write", || accounts.set_locked_until(owner_id, until)) {
        Ok(()) => match until {
            Some(until) => tracing::info!("Owner {} locked until {}", owner_id, until),
            None => tracing::info!("Owner {} unlocked", owner_id),
        },
        Err(e) => tracing::error!("Lock write for owner {} dropped: {}", owner_id, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryStore, StoreOp};
    use crate::model::NewAccount;
    use crate::StorageError;

    fn fast_policy() -> LockPolicy {
        LockPolicy {
            backoff_ms: vec![5, 5, 5, 5, 5, 5],
            shutdown_grace_ms: 2000,
        }
    }

    fn store_with_owner() -> (Arc<MemoryStore>, i64) {
        let store = Arc::new(MemoryStore::new());
        let id = store
            .insert_account(&NewAccount {
                username: "owner".into(),
                credential_hash: "x".into(),
                salt: None,
            })
            .unwrap();
        (store, id)
    }

    #[test]
    fn test_lock_then_unlock_applies_in_order() {
        let (store, id) = store_with_owner();
        let scheduler = LockScheduler::start(store.clone(), fast_policy()).unwrap();

        scheduler.schedule_lock(id, 10).unwrap();
        scheduler.schedule_lock(id, -1).unwrap();
        assert!(scheduler.flush(Duration::from_secs(5)));

        assert!(!scheduler.is_locked(id));
        let writes = store.lock_writes();
        assert_eq!(writes.len(), 2);
        assert!(writes[0].1.is_some());
        assert_eq!(writes[1], (id, None));
    }

    #[test]
    fn test_busy_write_is_retried_without_reordering() {
        let (store, id) = store_with_owner();
        for _ in 0..3 {
            store.push_fault(StoreOp::WriteLock, StorageError::Busy("database is locked".into()));
        }
        let scheduler = LockScheduler::start(store.clone(), fast_policy()).unwrap();

        scheduler.schedule_lock(id, 10).unwrap();
        scheduler.schedule_lock(id, 0).unwrap();
        assert!(scheduler.flush(Duration::from_secs(5)));

        let writes = store.lock_writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[1], (id, None));
        assert!(!scheduler.is_locked(id));
    }

    #[test]
    fn test_persistent_error_drops_only_that_task() {
        let (store, id) = store_with_owner();
        store.push_fault(StoreOp::WriteLock, StorageError::Backend("disk I/O error".into()));
        let scheduler = LockScheduler::start(store.clone(), fast_policy()).unwrap();

        scheduler.schedule_lock(id, -1).unwrap();
        scheduler.schedule_lock(id, 30).unwrap();
        assert!(scheduler.flush(Duration::from_secs(5)));

        assert_eq!(store.lock_writes().len(), 1);
        assert!(scheduler.is_locked(id));
    }

    #[test]
    fn test_is_locked_fails_open() {
        let (store, id) = store_with_owner();
        let scheduler = LockScheduler::start(store.clone(), fast_policy()).unwrap();
        scheduler.schedule_lock(id, 10).unwrap();
        assert!(scheduler.flush(Duration::from_secs(5)));
        assert!(scheduler.is_locked(id));

        store.push_fault(StoreOp::ReadLock, StorageError::Backend("io".into()));
        assert!(!scheduler.is_locked(id));
        assert!(scheduler.is_locked(id));
    }

    #[test]
    fn test_expired_lock_is_not_locked() {
        let (store, id) = store_with_owner();
        store
            .set_locked_until(id, Some(Utc::now() - chrono::Duration::minutes(1)))
            .unwrap();
        let scheduler = LockScheduler::start(store, fast_policy()).unwrap();
        assert!(!scheduler.is_locked(id));
    }

    #[test]
    fn test_invalid_owner_ignored() {
        let (store, _) = store_with_owner();
        let scheduler = LockScheduler::start(store.clone(), fast_policy()).unwrap();
        scheduler.schedule_lock(0, 10).unwrap();
        scheduler.schedule_lock(-3, 10).unwrap();
        assert!(scheduler.flush(Duration::from_secs(5)));
        assert!(store.lock_writes().is_empty());
        assert!(!scheduler.is_locked(0));
    }

    #[test]
    fn test_shutdown_drains_and_rejects_new_work() {
        let (store, id) = store_with_owner();
        let scheduler = LockScheduler::start(store.clone(), fast_policy()).unwrap();
        scheduler.schedule_lock(id, 5).unwrap();

        assert!(scheduler.shutdown(Duration::from_secs(5)));
        assert_eq!(store.lock_writes().len(), 1);
        assert!(matches!(scheduler.schedule_lock(id, 5), Err(Error::SchedulerClosed(_))));
        assert!(scheduler.shutdown(Duration::from_millis(1)));
    }

    #[test]
    fn test_shutdown_abandons_after_grace() {
        let (store, id) = store_with_owner();
        // keep the first write retrying until it gives up, well past the grace period
        for _ in 0..7 {
            store.push_fault(StoreOp::WriteLock, StorageError::Busy("busy".into()));
        }
        let policy = LockPolicy {
            backoff_ms: vec![100; 6],
            shutdown_grace_ms: 50,
        };
        let scheduler = LockScheduler::start(store.clone(), policy).unwrap();
        scheduler.schedule_lock(id, 5).unwrap();
        scheduler.schedule_lock(id, 10).unwrap();

        assert!(!scheduler.shutdown(Duration::from_millis(50)));
        thread::sleep(Duration::from_millis(900));
        // the in-flight write gave up; the queued one was never applied
        assert!(store.lock_writes().is_empty());
    }
}
