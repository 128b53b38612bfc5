//! Failed-attempt counter with automatic wipe
//!
//! `Normal` while the counter is below the threshold. Reaching it enters
//! `Exhausted`, which wipes the vault and terminates the process without
//! further interaction. The counter is persisted so relaunching the process
//! does not reset it.
//!
//! The persisted value is read once, at startup or on first use. From then
//! on the in-process count is authoritative and every change is written
//! through, so a failed write neither relaxes the threshold nor resurrects
//! a count that a successful login already cleared.

use crate::store::AttemptCounter;
use crate::wipe::WipeExecutor;
use parking_lot::Mutex;
use std::sync::Arc;
use vaultguard_params::DuressPolicy;

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuressState {
    /// Below threshold
    Normal,
    /// Threshold reached; the process is ending
    Exhausted,
}

/// Tracks consecutive failed authentications and triggers the wipe
pub struct DuressController {
    counter: Arc<dyn AttemptCounter>,
    wipe: WipeExecutor,
    policy: DuressPolicy,
    mirror: Mutex<Mirror>,
}

#[derive(Default)]
struct Mirror {
    count: u32,
    loaded: bool,
}

impl DuressController {
    /// Create a controller
    pub fn new(counter: Arc<dyn AttemptCounter>, wipe: WipeExecutor, policy: DuressPolicy) -> Self {
        Self {
            counter,
            wipe,
            policy,
            mirror: Mutex::new(Mirror::default()),
        }
    }

    /// Current state from the in-process view of the counter
    pub fn state(&self) -> DuressState {
        if self.attempts() >= self.policy.max_failed_attempts {
            DuressState::Exhausted
        } else {
            DuressState::Normal
        }
    }

    /// Consecutive failures seen so far
    pub fn attempts(&self) -> u32 {
        self.mirror.lock().count
    }

    /// Run once at process start, before any prompt. Wipes and terminates if
    /// the persisted counter is already at the threshold.
    pub fn check_startup(&self) -> DuressState {
        let persisted = self.read_persisted();
        {
            let mut mirror = self.mirror.lock();
            mirror.count = mirror.count.max(persisted);
            mirror.loaded = true;
        }
        if self.state() == DuressState::Exhausted {
            tracing::error!("Failed attempt counter exhausted at startup");
            self.exhaust();
        }
        tracing::debug!("Startup attempt counter: {}", persisted);
        DuressState::Normal
    }

    /// Successful authentication: reset to zero
    pub fn record_success(&self) {
        {
            let mut mirror = self.mirror.lock();
            mirror.count = 0;
            mirror.loaded = true;
        }
        if let Err(e) = self.counter.set_attempt_counter(0) {
            // the next write of the in-process count supersedes the stale value
            tracing::warn!("Failed to reset attempt counter: {}", e);
        }
    }

    /// Failed authentication: increment, and wipe + terminate on reaching
    /// the threshold. Returns the new count when below it.
    pub fn record_failure(&self) -> u32 {
        let count = {
            let mut mirror = self.mirror.lock();
            if !mirror.loaded {
                mirror.count = mirror.count.max(self.read_persisted());
                mirror.loaded = true;
            }
            mirror.count = mirror.count.saturating_add(1);
            mirror.count
        };

        if let Err(e) = self.counter.set_attempt_counter(count) {
            tracing::warn!("Failed to persist attempt counter: {}", e);
        }
        tracing::info!(
            "Failed attempt {}/{}",
            count,
            self.policy.max_failed_attempts
        );

        if count >= self.policy.max_failed_attempts {
            tracing::error!("Failed attempt threshold reached");
            self.exhaust();
        }
        count
    }

    /// User-invoked panic: wipe and terminate regardless of the counter
    pub fn panic(&self) -> ! {
        tracing::warn!("Panic wipe requested");
        self.wipe.wipe_and_exit()
    }

    fn exhaust(&self) -> ! {
        self.wipe.wipe_and_exit()
    }

    fn read_persisted(&self) -> u32 {
        match self.counter.get_attempt_counter() {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Failed to read attempt counter: {}", e);
                0
            }
        }
    }
}
