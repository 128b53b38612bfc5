//! Data model shared by the core and its storage collaborator

use crate::kdf::EntryKey;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// Stored account record
///
/// If `salt` is present, `credential_hash` is the base64 PBKDF2 output;
/// otherwise it is the legacy base64 SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Account ID
    pub id: i64,
    /// Unique username
    pub username: String,
    /// Credential material (base64)
    pub credential_hash: String,
    /// Per-account salt (salted scheme only)
    pub salt: Option<Vec<u8>>,
    /// Lock deadline, written only by the lock scheduler
    pub locked_until: Option<DateTime<Utc>>,
}

impl Account {
    /// Whether this account still uses the legacy unsalted digest
    pub fn is_legacy(&self) -> bool {
        self.salt.as_ref().map_or(true, |s| s.is_empty())
    }
}

/// Account to be inserted at provisioning time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    /// Unique username
    pub username: String,
    /// Credential material (base64)
    pub credential_hash: String,
    /// Salt, `None` for legacy accounts
    pub salt: Option<Vec<u8>>,
}

/// Event type in the append-only log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// PIN submitted
    LoginAttempt,
    /// PIN accepted
    LoginSuccess,
    /// PIN rejected or unknown user
    LoginFailed,
    /// Entry added
    AddEntry,
    /// Entry edited
    EditEntry,
    /// Entry deleted
    DeleteEntry,
}

impl EventType {
    /// All event types
    pub const ALL: [EventType; 6] = [
        EventType::LoginAttempt,
        EventType::LoginSuccess,
        EventType::LoginFailed,
        EventType::AddEntry,
        EventType::EditEntry,
        EventType::DeleteEntry,
    ];

    /// Persisted name
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::LoginAttempt => "LOGIN_ATTEMPT",
            EventType::LoginSuccess => "LOGIN_SUCCESS",
            EventType::LoginFailed => "LOGIN_FAILED",
            EventType::AddEntry => "ADD_ENTRY",
            EventType::EditEntry => "EDIT_ENTRY",
            EventType::DeleteEntry => "DELETE_ENTRY",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ParseEventTypeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| ParseEventTypeError(s.to_string()))
    }
}

/// Unknown event type name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown event type: {0}")]
pub struct ParseEventTypeError(pub String);

/// Stored event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Event ID
    pub id: i64,
    /// Acting owner, `None` when unknown
    pub owner_id: Option<i64>,
    /// Event type
    pub event_type: EventType,
    /// Free-form metadata
    pub metadata: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Event to append
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    /// Acting owner, `None` when unknown
    pub owner_id: Option<i64>,
    /// Event type
    pub event_type: EventType,
    /// Free-form metadata
    pub metadata: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl NewEvent {
    /// Event stamped with the current time. Owner id `0` is treated as unknown.
    pub fn now(owner_id: Option<i64>, event_type: EventType, metadata: Option<String>) -> Self {
        Self {
            owner_id: owner_id.filter(|id| *id > 0),
            event_type,
            metadata,
            created_at: Utc::now(),
        }
    }
}

/// Aggregate query over the event log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    /// Restrict to one owner; `None` counts across all owners
    pub owner_id: Option<i64>,
    /// Event types to count
    pub event_types: Vec<EventType>,
    /// Only events at or after this instant
    pub since: DateTime<Utc>,
}

impl EventFilter {
    /// Whether `event` matches this filter
    pub fn matches(&self, event: &Event) -> bool {
        self.owner_id.map_or(true, |id| event.owner_id == Some(id))
            && self.event_types.contains(&event.event_type)
            && event.created_at >= self.since
    }
}

/// Authenticated session returned on a granted login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Authenticated account ID
    pub owner_id: i64,
    /// Authenticated username
    pub username: String,
    /// Key for the entry store, bound to the entered PIN
    pub entry_key: EntryKey,
}

/// Outcome of a PIN verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    /// PIN accepted
    Granted(Session),
    /// PIN rejected
    Denied,
    /// Username does not exist
    NoSuchUser,
}

impl VerifyResult {
    /// Whether access was granted
    pub fn is_granted(&self) -> bool {
        matches!(self, VerifyResult::Granted(_))
    }

    /// Session, if granted
    pub fn session(&self) -> Option<&Session> {
        match self {
            VerifyResult::Granted(session) => Some(session),
            _ => None,
        }
    }
}
