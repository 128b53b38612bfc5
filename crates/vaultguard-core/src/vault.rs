//! Facade exposed to the UI collaborator
//!
//! Wires the components over one injected store and sequences them the way
//! a login is processed: verify, log the outcome, then feed the duress
//! counter. Everything here is synchronous except lock scheduling.

use crate::anomaly::{Alert, AnomalyDetector};
use crate::duress::{DuressController, DuressState};
use crate::lock::LockScheduler;
use crate::model::{Event, EventType, NewEvent, VerifyResult};
use crate::store::{CredentialStore, EventLog, VaultStore};
use crate::verifier::CredentialVerifier;
use crate::wipe::WipeExecutor;
use crate::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use vaultguard_params::VaultConfig;

/// Duress-aware vault core
pub struct Vault {
    credentials: Arc<dyn CredentialStore>,
    events: Arc<dyn EventLog>,
    verifier: CredentialVerifier,
    scheduler: LockScheduler,
    detector: AnomalyDetector,
    duress: DuressController,
    config: VaultConfig,
}

impl Vault {
    /// Build the vault over `store`; the wipe targets come from the store
    pub fn new<S: VaultStore + 'static>(store: Arc<S>, config: VaultConfig) -> Result<Self> {
        let wipe = WipeExecutor::new(store.as_ref());
        Self::with_wipe(store, config, wipe)
    }

    /// Build the vault with a preconfigured wipe executor
    pub fn with_wipe<S: VaultStore + 'static>(store: Arc<S>, config: VaultConfig, wipe: WipeExecutor) -> Result<Self> {
        let credentials: Arc<dyn CredentialStore> = store.clone();
        let events: Arc<dyn EventLog> = store.clone();

        let verifier = CredentialVerifier::new(credentials.clone(), config.lock.clone());
        let scheduler = LockScheduler::start(credentials.clone(), config.lock.clone())?;
        let detector = AnomalyDetector::new(events.clone(), config.anomaly.clone());
        let duress = DuressController::new(store, wipe, config.duress.clone());

        Ok(Self {
            credentials,
            events,
            verifier,
            scheduler,
            detector,
            duress,
            config,
        })
    }

    /// Must run before the first prompt. Terminates the process if the
    /// failed-attempt counter is already exhausted.
    pub fn startup(&self) -> DuressState {
        self.duress.check_startup()
    }

    /// Verify a PIN.
    ///
    /// `Denied` and `NoSuchUser` both count as failed attempts; the call
    /// that reaches the threshold does not return.
    pub fn verify(&self, username: &str, pin: &str) -> Result<VerifyResult> {
        self.record_event(None, EventType::LoginAttempt, Some(&format!("user={}", username)));

        let result = self.verifier.verify(username, pin)?;
        self.record_outcome(username, &result);
        Ok(result)
    }

    fn record_outcome(&self, username: &str, result: &VerifyResult) {
        match result {
            VerifyResult::Granted(session) => {
                self.record_event(Some(session.owner_id), EventType::LoginSuccess, None);
                self.duress.record_success();
            }
            VerifyResult::Denied => self.record_failure(self.owner_id_for(username), username),
            VerifyResult::NoSuchUser => self.record_failure(None, username),
        }
    }

    fn record_failure(&self, owner_id: Option<i64>, username: &str) {
        self.record_event(owner_id, EventType::LoginFailed, Some(&format!("user={}", username)));
        self.duress.record_failure();
    }

    /// Checks to run after a login attempt
    pub fn after_login_checks(&self, owner_id: Option<i64>) -> Option<Alert> {
        self.detector.after_login(owner_id)
    }

    /// Checks to run after entry activity
    pub fn after_activity_checks(&self, owner_id: Option<i64>) -> Option<Alert> {
        self.detector.after_activity(owner_id)
    }

    /// Queue a lock decision; see [`LockScheduler::schedule_lock`]
    pub fn schedule_lock(&self, owner_id: i64, minutes: i64) -> Result<()> {
        self.scheduler.schedule_lock(owner_id, minutes)
    }

    /// Fail-open lock check
    pub fn is_locked(&self, owner_id: i64) -> bool {
        self.scheduler.is_locked(owner_id)
    }

    /// Raw lock deadline
    pub fn locked_until(&self, owner_id: i64) -> Result<Option<DateTime<Utc>>> {
        self.scheduler.locked_until(owner_id)
    }

    /// Wait for queued lock writes; see [`LockScheduler::flush`]
    pub fn flush_locks(&self) -> bool {
        self.scheduler.flush(self.config.lock.shutdown_grace())
    }

    /// Wipe everything and terminate
    pub fn trigger_panic(&self) -> ! {
        self.duress.panic()
    }

    /// Append to the event log. Failures are logged, never returned.
    pub fn record_event(&self, owner_id: Option<i64>, event_type: EventType, metadata: Option<&str>) -> Option<i64> {
        let event = NewEvent::now(owner_id, event_type, metadata.map(str::to_string));
        match self.events.append_event(&event) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!("Failed to record {} event: {}", event_type, e);
                None
            }
        }
    }

    /// Newest events first
    pub fn recent_events(&self, limit: usize) -> Result<Vec<Event>> {
        Ok(self.events.recent_events(limit)?)
    }

    /// Change a PIN after verifying the current one.
    ///
    /// The current PIN is an authentication like any other: it is logged and
    /// a wrong one counts toward the duress threshold. A rejected new PIN is
    /// an error and checks nothing.
    pub fn change_pin(&self, username: &str, current_pin: &str, new_pin: &str) -> Result<VerifyResult> {
        self.record_event(None, EventType::LoginAttempt, Some(&format!("user={} op=change-pin", username)));

        let result = self.verifier.change_pin(username, current_pin, new_pin)?;
        self.record_outcome(username, &result);
        Ok(result)
    }

    /// Duress state as seen by this process
    pub fn duress_state(&self) -> DuressState {
        self.duress.state()
    }

    /// Consecutive failed attempts
    pub fn failed_attempts(&self) -> u32 {
        self.duress.attempts()
    }

    /// Orderly shutdown: drain lock writes within the configured grace
    pub fn shutdown(&self) -> bool {
        self.scheduler.shutdown(self.config.lock.shutdown_grace())
    }

    fn owner_id_for(&self, username: &str) -> Option<i64> {
        match self.credentials.get_account(username) {
            Ok(account) => account.map(|a| a.id),
            Err(e) => {
                tracing::debug!("Owner lookup for failed login: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::provision;
    use crate::store::{AttemptCounter, CredentialStore};

    fn vault() -> (Arc<MemoryStore>, Vault) {
        let store = Arc::new(MemoryStore::new());
        let vault = Vault::new(store.clone(), VaultConfig::default()).unwrap();
        (store, vault)
    }

    #[test]
    fn test_verify_logs_attempt_and_outcome() {
        let (store, vault) = vault();
        let id = provision::provision_account(store.as_ref(), "owner", "1234").unwrap();

        assert!(vault.verify("owner", "1234").unwrap().is_granted());
        assert_eq!(vault.verify("owner", "0000").unwrap(), VerifyResult::Denied);

        let kinds: Vec<_> = store.events().iter().map(|e| (e.event_type, e.owner_id)).collect();
        assert_eq!(
            kinds,
            vec![
                (EventType::LoginAttempt, None),
                (EventType::LoginSuccess, Some(id)),
                (EventType::LoginAttempt, None),
                (EventType::LoginFailed, Some(id)),
            ]
        );
        assert_eq!(vault.failed_attempts(), 1);
    }

    #[test]
    fn test_unknown_user_counts_as_failure() {
        let (store, vault) = vault();
        assert_eq!(vault.verify("ghost", "1234").unwrap(), VerifyResult::NoSuchUser);
        assert_eq!(store.get_attempt_counter(), Ok(1));
        let last = store.events().pop().unwrap();
        assert_eq!((last.event_type, last.owner_id), (EventType::LoginFailed, None));
    }

    #[test]
    fn test_success_resets_counter() {
        let (store, vault) = vault();
        provision::provision_account(store.as_ref(), "owner", "1234").unwrap();
        for _ in 0..4 {
            vault.verify("owner", "0000").unwrap();
        }
        assert_eq!(store.get_attempt_counter(), Ok(4));
        vault.verify("owner", "1234").unwrap();
        assert_eq!(store.get_attempt_counter(), Ok(0));
        assert_eq!(vault.duress_state(), DuressState::Normal);
    }

    #[test]
    fn test_record_event_never_fails_caller() {
        let (store, vault) = vault();
        store.push_fault(
            crate::memory::StoreOp::AppendEvent,
            crate::StorageError::Backend("disk full".into()),
        );
        assert_eq!(vault.record_event(Some(1), EventType::AddEntry, None), None);
        assert!(vault.record_event(Some(0), EventType::AddEntry, Some("x")).is_some());
        assert_eq!(vault.recent_events(1).unwrap()[0].owner_id, None);
    }

    #[test]
    fn test_change_pin_counts_wrong_current_pin() {
        let (store, vault) = vault();
        provision::provision_account(store.as_ref(), "owner", "1234").unwrap();

        assert_eq!(vault.change_pin("owner", "0000", "5678").unwrap(), VerifyResult::Denied);
        assert_eq!(vault.change_pin("ghost", "0000", "5678").unwrap(), VerifyResult::NoSuchUser);
        assert_eq!(store.get_attempt_counter(), Ok(2));
        let failed = store
            .events()
            .iter()
            .filter(|e| e.event_type == EventType::LoginFailed)
            .count();
        assert_eq!(failed, 2);

        // an invalid new PIN is rejected before the current one is checked
        assert!(vault.change_pin("owner", "0000", "12").is_err());
        assert_eq!(vault.failed_attempts(), 2);

        assert!(vault.change_pin("owner", "1234", "5678").unwrap().is_granted());
        assert_eq!(store.get_attempt_counter(), Ok(0));
        assert!(vault.verify("owner", "5678").unwrap().is_granted());
    }

    #[test]
    fn test_unreadable_stored_hash_counts_as_failure() {
        let (store, vault) = vault();
        store
            .insert_account(&crate::model::NewAccount {
                username: "owner".into(),
                credential_hash: "not base64!".into(),
                salt: Some(vec![1u8; 16]),
            })
            .unwrap();

        assert_eq!(vault.verify("owner", "1234").unwrap(), VerifyResult::Denied);
        assert_eq!(store.get_attempt_counter(), Ok(1));
    }

    #[test]
    fn test_schedule_lock_round_trip() {
        let (store, vault) = vault();
        let id = provision::provision_account(store.as_ref(), "owner", "1234").unwrap();

        vault.schedule_lock(id, 15).unwrap();
        assert!(vault.flush_locks());
        assert!(vault.is_locked(id));
        assert!(vault.locked_until(id).unwrap().is_some());

        vault.schedule_lock(id, 0).unwrap();
        assert!(vault.shutdown());
        assert!(!vault.is_locked(id));
    }
}
