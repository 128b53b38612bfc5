//! Detection, duress and lock-persistence policies

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// PBKDF2-HMAC-SHA256 iteration count for salted credentials
pub const KDF_ITERATIONS: u32 = 65_536;

/// Derived key / credential hash length in bytes (256 bits)
pub const KEY_LEN: usize = 32;

/// Per-account salt length in bytes
pub const SALT_LEN: usize = 16;

/// Thresholds for the rule-based anomaly detector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyPolicy {
    /// Failed logins that trigger a burst alert
    pub failed_login_threshold: u32,
    /// Lookback window for the burst rule (minutes)
    pub failed_login_window_minutes: u32,
    /// Edit/delete events that trigger a rapid-activity alert
    pub rapid_edit_threshold: u32,
    /// Lookback window for the rapid-activity rule (minutes)
    pub rapid_edit_window_minutes: u32,
    /// Hours between the usual login hour and the current hour that count as unusual
    pub unusual_hour_delta: u32,
}

impl Default for AnomalyPolicy {
    fn default() -> Self {
        Self {
            failed_login_threshold: 5,
            failed_login_window_minutes: 10,
            rapid_edit_threshold: 10,
            rapid_edit_window_minutes: 5,
            unusual_hour_delta: 6,
        }
    }
}

impl AnomalyPolicy {
    /// Reject thresholds or windows that would make a rule fire on nothing
    pub fn validate(&self) -> Result<()> {
        if self.failed_login_threshold == 0 || self.rapid_edit_threshold == 0 {
            return Err(Error::Invalid("anomaly thresholds must be non-zero".to_string()));
        }
        if self.failed_login_window_minutes == 0 || self.rapid_edit_window_minutes == 0 {
            return Err(Error::Invalid("anomaly windows must be non-zero".to_string()));
        }
        if self.unusual_hour_delta == 0 || self.unusual_hour_delta > 23 {
            return Err(Error::Invalid(format!(
                "unusual_hour_delta must be in 1..=23, got {}",
                self.unusual_hour_delta
            )));
        }
        Ok(())
    }
}

/// Consecutive-failure policy for the duress controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuressPolicy {
    /// Consecutive failed authentications before the vault is wiped
    pub max_failed_attempts: u32,
}

impl Default for DuressPolicy {
    fn default() -> Self {
        Self { max_failed_attempts: 5 }
    }
}

impl DuressPolicy {
    /// Validate the policy
    pub fn validate(&self) -> Result<()> {
        if self.max_failed_attempts == 0 {
            return Err(Error::Invalid("max_failed_attempts must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Retry schedule for the background lock writer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockPolicy {
    /// Sleep before each retry of a busy write; its length is the retry budget
    pub backoff_ms: Vec<u64>,
    /// How long shutdown waits for queued lock writes to drain
    pub shutdown_grace_ms: u64,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            backoff_ms: vec![200, 400, 600, 800, 1000, 1200],
            shutdown_grace_ms: 1000,
        }
    }
}

impl LockPolicy {
    /// Maximum number of retries after the first attempt
    pub fn max_retries(&self) -> usize {
        self.backoff_ms.len()
    }

    /// Backoff before retry number `retry` (1-based); `None` once the budget is spent
    pub fn backoff(&self, retry: usize) -> Option<Duration> {
        retry
            .checked_sub(1)
            .and_then(|i| self.backoff_ms.get(i))
            .map(|ms| Duration::from_millis(*ms))
    }

    /// Grace period for draining on shutdown
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Validate the policy
    pub fn validate(&self) -> Result<()> {
        if self.backoff_ms.is_empty() {
            return Err(Error::Invalid("lock backoff schedule must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_anomaly_policy() {
        let policy = AnomalyPolicy::default();
        assert_eq!(policy.failed_login_threshold, 5);
        assert_eq!(policy.failed_login_window_minutes, 10);
        assert_eq!(policy.rapid_edit_threshold, 10);
        assert_eq!(policy.rapid_edit_window_minutes, 5);
        assert_eq!(policy.unusual_hour_delta, 6);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_lock_backoff_schedule() {
        let policy = LockPolicy::default();
        assert_eq!(policy.max_retries(), 6);
        assert_eq!(policy.backoff(0), None);
        assert_eq!(policy.backoff(1), Some(Duration::from_millis(200)));
        assert_eq!(policy.backoff(6), Some(Duration::from_millis(1200)));
        assert_eq!(policy.backoff(7), None);
    }

    #[test]
    fn test_invalid_policies_rejected() {
        let anomaly = AnomalyPolicy {
            failed_login_threshold: 0,
            ..AnomalyPolicy::default()
        };
        assert!(anomaly.validate().is_err());

        let duress = DuressPolicy { max_failed_attempts: 0 };
        assert!(duress.validate().is_err());

        let lock = LockPolicy {
            backoff_ms: vec![],
            shutdown_grace_ms: 10,
        };
        assert!(lock.validate().is_err());
    }
}
