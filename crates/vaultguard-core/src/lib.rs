//! Duress-aware authentication and anomaly response for a local PIN vault
//!
//! ## Components
//!
//! - **Credential Verifier**: PBKDF2-HMAC-SHA256 salted PINs, transparent
//!   migration of legacy unsalted SHA-256 digests on first successful login
//! - **Lock Scheduler**: single background writer for account lock state,
//!   FIFO, with retry on storage contention
//! - **Anomaly Detector**: rule-based alerts over the append-only event log
//! - **Duress Controller**: persisted consecutive-failure counter that wipes
//!   the vault once the threshold is crossed
//! - **Wipe Executor**: best-effort recursive deletion of all vault state,
//!   followed by process termination
//!
//! Storage is injected through the traits in [`store`]; the SQLite
//! implementation lives in `vaultguard-storage-sqlite`, and [`MemoryStore`]
//! backs the tests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod anomaly;
pub mod duress;
pub mod error;
pub mod kdf;
pub mod lock;
pub mod memory;
pub mod model;
pub mod provision;
pub mod retry;
pub mod store;
pub mod vault;
pub mod verifier;
pub mod wipe;

pub use anomaly::{Alert, AlertRule, AnomalyDetector};
pub use duress::{DuressController, DuressState};
pub use error::{Error, Result, StorageError, StorageResult};
pub use kdf::{EntryKey, SaltedCredential};
pub use lock::LockScheduler;
pub use memory::{MemoryStore, StoreOp};
pub use model::{
    Account, Event, EventFilter, EventType, NewAccount, NewEvent, ParseEventTypeError, Session, VerifyResult,
};
pub use provision::{ensure_default_account, provision_account, provision_legacy_account, DEFAULT_USERNAME};
pub use store::{AttemptCounter, CredentialStore, EventLog, StatePaths, VaultStore};
pub use vault::Vault;
pub use verifier::CredentialVerifier;
pub use wipe::{FileRemover, FsRemover, ProcessExit, Terminator, WipeExecutor, WipeReport, WIPE_EXIT_CODE};

pub use vaultguard_params as params;
