//! Rule-based anomaly detection over the event log
//!
//! The detector holds no state of its own. Every rule is a single aggregate
//! query; a query failure is logged and reported as "no finding", since
//! detection is advisory.

use crate::model::{EventFilter, EventType};
use crate::store::EventLog;
use chrono::{Local, Timelike, Utc};
use std::fmt;
use std::sync::Arc;
use vaultguard_params::AnomalyPolicy;

/// Rule that produced an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertRule {
    /// Too many failed logins in the window
    FailedLoginBurst,
    /// Login far from the owner's usual hour
    UnusualLoginHour,
    /// Too many edits/deletes in the window
    RapidEdits,
}

/// Human-readable finding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    /// Rule that fired
    pub rule: AlertRule,
    /// Message for the user
    pub message: String,
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Stateless rule evaluator
pub struct AnomalyDetector {
    events: Arc<dyn EventLog>,
    policy: AnomalyPolicy,
}

impl AnomalyDetector {
    /// Create a detector over `events`
    pub fn new(events: Arc<dyn EventLog>, policy: AnomalyPolicy) -> Self {
        Self { events, policy }
    }

    /// Active policy
    pub fn policy(&self) -> &AnomalyPolicy {
        &self.policy
    }

    /// `LOGIN_FAILED` events for the owner (or for everyone, when `None`)
    /// within the trailing window reach `threshold`
    pub fn failed_login_burst(&self, owner_id: Option<i64>, threshold: u32, window_minutes: u32) -> Option<Alert> {
        let count = self.count_recent(owner_id, vec![EventType::LoginFailed], window_minutes)?;
        (count >= u64::from(threshold)).then(|| Alert {
            rule: AlertRule::FailedLoginBurst,
            message: format!(
                "Multiple failed login attempts detected ({} in last {} minutes).",
                count, window_minutes
            ),
        })
    }

    /// The owner's most common login hour is at least the policy delta away
    /// from `current_hour`. The difference does not wrap around midnight.
    pub fn unusual_login_hour(&self, owner_id: i64, current_hour: u32) -> Option<Alert> {
        let top_hour = match self.events.top_login_hour(owner_id) {
            Ok(hour) => hour?,
            Err(e) => {
                tracing::warn!("Login hour query failed for owner {}: {}", owner_id, e);
                return None;
            }
        };

        (top_hour.abs_diff(current_hour) >= self.policy.unusual_hour_delta).then(|| Alert {
            rule: AlertRule::UnusualLoginHour,
            message: format!(
                "Login at unusual hour ({}:00). Most logins occur around {}:00.",
                current_hour, top_hour
            ),
        })
    }

    /// `EDIT_ENTRY` + `DELETE_ENTRY` events within the trailing window reach
    /// `threshold`
    pub fn rapid_edits(&self, owner_id: Option<i64>, threshold: u32, window_minutes: u32) -> Option<Alert> {
        let count = self.count_recent(
            owner_id,
            vec![EventType::EditEntry, EventType::DeleteEntry],
            window_minutes,
        )?;
        (count >= u64::from(threshold)).then(|| Alert {
            rule: AlertRule::RapidEdits,
            message: format!(
                "High rate of edits/deletes detected ({} in last {} minutes).",
                count, window_minutes
            ),
        })
    }

    /// Checks run after a login: failed-login burst first, then (for a known
    /// owner) the unusual-hour rule at the current local hour. First finding wins.
    pub fn after_login(&self, owner_id: Option<i64>) -> Option<Alert> {
        self.after_login_at(owner_id, Local::now().hour())
    }

    /// [`after_login`](Self::after_login) with an explicit local hour
    pub fn after_login_at(&self, owner_id: Option<i64>, current_hour: u32) -> Option<Alert> {
        self.failed_login_burst(
            owner_id,
            self.policy.failed_login_threshold,
            self.policy.failed_login_window_minutes,
        )
        .or_else(|| owner_id.and_then(|id| self.unusual_login_hour(id, current_hour)))
    }

    /// Checks run after entry activity: rapid edits only
    pub fn after_activity(&self, owner_id: Option<i64>) -> Option<Alert> {
        self.rapid_edits(
            owner_id,
            self.policy.rapid_edit_threshold,
            self.policy.rapid_edit_window_minutes,
        )
    }

    fn count_recent(&self, owner_id: Option<i64>, event_types: Vec<EventType>, window_minutes: u32) -> Option<u64> {
        let filter = EventFilter {
            owner_id,
            event_types,
            since: Utc::now() - chrono::Duration::minutes(i64::from(window_minutes)),
        };
        match self.events.count_events(&filter) {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::warn!("Event count query failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryStore, StoreOp};
    use crate::StorageError;
    use chrono::{DateTime, Duration, TimeZone};

    fn detector(store: &Arc<MemoryStore>) -> AnomalyDetector {
        AnomalyDetector::new(store.clone(), AnomalyPolicy::default())
    }

    fn failures(store: &MemoryStore, owner: Option<i64>, n: usize, age: Duration) {
        for _ in 0..n {
            store.insert_event_at(owner, EventType::LoginFailed, Utc::now() - age);
        }
    }

    fn local_at_hour(day: u32, hour: u32) -> DateTime<Utc> {
        Local
            .with_ymd_and_hms(2024, 5, day, hour, 30, 0)
            .earliest()
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_failed_login_burst_threshold() {
        let store = Arc::new(MemoryStore::new());
        let detector = detector(&store);

        failures(&store, Some(1), 4, Duration::minutes(1));
        assert!(detector.failed_login_burst(Some(1), 5, 10).is_none());

        failures(&store, Some(1), 1, Duration::minutes(2));
        let alert = detector.failed_login_burst(Some(1), 5, 10).unwrap();
        assert_eq!(alert.rule, AlertRule::FailedLoginBurst);
        assert_eq!(
            alert.to_string(),
            "Multiple failed login attempts detected (5 in last 10 minutes)."
        );
    }

    #[test]
    fn test_failed_login_burst_ignores_old_events() {
        let store = Arc::new(MemoryStore::new());
        failures(&store, Some(1), 5, Duration::minutes(11));
        assert!(detector(&store).failed_login_burst(Some(1), 5, 10).is_none());
    }

    #[test]
    fn test_failed_login_burst_global_counts_unknown_owner() {
        let store = Arc::new(MemoryStore::new());
        failures(&store, None, 3, Duration::minutes(1));
        failures(&store, Some(2), 2, Duration::minutes(1));
        let detector = detector(&store);

        assert!(detector.failed_login_burst(None, 5, 10).is_some());
        assert!(detector.failed_login_burst(Some(2), 5, 10).is_none());
    }

    #[test]
    fn test_unusual_login_hour() {
        let store = Arc::new(MemoryStore::new());
        for day in 1..=5 {
            store.insert_event_at(Some(1), EventType::LoginSuccess, local_at_hour(day, 9));
        }
        let detector = detector(&store);

        let alert = detector.unusual_login_hour(1, 15).unwrap();
        assert_eq!(alert.rule, AlertRule::UnusualLoginHour);
        assert_eq!(alert.message, "Login at unusual hour (15:00). Most logins occur around 9:00.");
        assert!(detector.unusual_login_hour(1, 14).is_none());
        assert!(detector.unusual_login_hour(1, 3).is_some());
        assert!(detector.unusual_login_hour(1, 9).is_none());
        // no history, no finding
        assert!(detector.unusual_login_hour(2, 15).is_none());
    }

    #[test]
    fn test_unusual_hour_does_not_wrap_midnight() {
        let store = Arc::new(MemoryStore::new());
        store.insert_event_at(Some(1), EventType::LoginSuccess, local_at_hour(1, 23));
        // 23 vs 1 is |22|, not 2
        assert!(detector(&store).unusual_login_hour(1, 1).is_some());
    }

    #[test]
    fn test_rapid_edits() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..9 {
            let kind = if i % 2 == 0 { EventType::EditEntry } else { EventType::DeleteEntry };
            store.insert_event_at(Some(1), kind, Utc::now() - Duration::minutes(1));
        }
        store.insert_event_at(Some(1), EventType::AddEntry, Utc::now());
        let detector = detector(&store);
        assert!(detector.after_activity(Some(1)).is_none());

        store.insert_event_at(Some(1), EventType::EditEntry, Utc::now());
        let alert = detector.after_activity(Some(1)).unwrap();
        assert_eq!(alert.rule, AlertRule::RapidEdits);
        assert!(alert.message.contains("10 in last 5 minutes"));
    }

    #[test]
    fn test_after_login_short_circuits_on_burst() {
        let store = Arc::new(MemoryStore::new());
        store.insert_event_at(Some(1), EventType::LoginSuccess, local_at_hour(1, 9));
        failures(&store, Some(1), 5, Duration::minutes(1));
        let detector = detector(&store);

        let alert = detector.after_login_at(Some(1), 20).unwrap();
        assert_eq!(alert.rule, AlertRule::FailedLoginBurst);
    }

    #[test]
    fn test_after_login_unknown_owner_skips_hour_rule() {
        let store = Arc::new(MemoryStore::new());
        store.insert_event_at(Some(1), EventType::LoginSuccess, local_at_hour(1, 9));
        let detector = detector(&store);

        assert!(detector.after_login_at(None, 20).is_none());
        assert_eq!(
            detector.after_login_at(Some(1), 20).map(|a| a.rule),
            Some(AlertRule::UnusualLoginHour)
        );
    }

    #[test]
    fn test_query_failure_is_no_finding() {
        let store = Arc::new(MemoryStore::new());
        failures(&store, Some(1), 6, Duration::minutes(1));
        store.push_fault(StoreOp::QueryEvents, StorageError::Busy("busy".into()));
        let detector = detector(&store);

        assert!(detector.failed_login_burst(Some(1), 5, 10).is_none());
        assert!(detector.failed_login_burst(Some(1), 5, 10).is_some());
    }
}
