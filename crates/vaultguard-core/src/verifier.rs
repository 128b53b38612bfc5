//! Credential verification with legacy migration

use crate::kdf::{self, EntryKey, SaltedCredential};
use crate::model::{Account, Session, VerifyResult};
use crate::retry::with_busy_retry;
use crate::store::CredentialStore;
use crate::{Error, Result};
use std::sync::Arc;
use vaultguard_params::LockPolicy;

/// Checks entered PINs against stored credential material.
///
/// Salted accounts are checked with PBKDF2. Legacy accounts are checked
/// against the unsalted digest and, on a match, rewritten to the salted
/// scheme before the grant is returned. A failed rewrite is logged; the
/// grant stands.
pub struct CredentialVerifier {
    accounts: Arc<dyn CredentialStore>,
    retry: LockPolicy,
}

impl CredentialVerifier {
    /// Create a verifier; `retry` is the backoff used for the migration write
    pub fn new(accounts: Arc<dyn CredentialStore>, retry: LockPolicy) -> Self {
        Self { accounts, retry }
    }

    /// Verify `pin` for `username`
    pub fn verify(&self, username: &str, pin: &str) -> Result<VerifyResult> {
        let Some(account) = self.accounts.get_account(username)? else {
            tracing::debug!("Verification for unknown user");
            return Ok(VerifyResult::NoSuchUser);
        };

        match account.salt.as_deref() {
            Some(salt) if !salt.is_empty() => match SaltedCredential::verify(pin, &account.credential_hash, salt) {
                Ok(true) => grant(&account, pin, salt),
                Ok(false) => Ok(VerifyResult::Denied),
                // nothing can match it; still an attempt that must be counted
                Err(Error::InvalidCredential(reason)) => {
                    tracing::error!("Stored credential for user {} is unreadable: {}", account.username, reason);
                    Ok(VerifyResult::Denied)
                }
                Err(e) => Err(e),
            },
            _ => self.verify_legacy(account, pin),
        }
    }

    fn verify_legacy(&self, account: Account, pin: &str) -> Result<VerifyResult> {
        let digest = kdf::legacy_digest(pin);
        if !kdf::constant_time_eq(digest.as_bytes(), account.credential_hash.trim().as_bytes()) {
            return Ok(VerifyResult::Denied);
        }

        let upgraded = SaltedCredential::new(pin)?;
        let migrated = Account {
            credential_hash: upgraded.hash,
            salt: Some(upgraded.salt),
            ..account
        };

        match with_busy_retry(&self.retry, "credential migration", || {
            self.accounts.update_account(&migrated)
        }) {
            Ok(()) => {
                tracing::info!("Migrated legacy credential for user {}", migrated.username);
                let salt = migrated.salt.as_deref().unwrap_or_default();
                grant(&migrated, pin, salt)
            }
            Err(e) => {
                tracing::warn!(
                    "Legacy credential migration failed for user {}: {}",
                    migrated.username,
                    e
                );
                // still legacy on disk; key the session to the unsalted state
                grant(&migrated, pin, &[])
            }
        }
    }

    /// Replace the PIN for `username` after verifying the current one.
    ///
    /// Returns the verification outcome of `current_pin`; on `Granted` the
    /// session carries the entry key for the new PIN.
    pub fn change_pin(&self, username: &str, current_pin: &str, new_pin: &str) -> Result<VerifyResult> {
        kdf::validate_new_pin(new_pin)?;

        let session = match self.verify(username, current_pin)? {
            VerifyResult::Granted(session) => session,
            other => return Ok(other),
        };

        // re-read so a just-migrated account carries its current state
        let Some(account) = self.accounts.get_account_by_id(session.owner_id)? else {
            return Ok(VerifyResult::NoSuchUser);
        };

        let fresh = SaltedCredential::new(new_pin)?;
        let updated = Account {
            credential_hash: fresh.hash,
            salt: Some(fresh.salt),
            ..account
        };
        with_busy_retry(&self.retry, "credential change", || self.accounts.update_account(&updated))?;

        tracing::info!("Credential changed for user {}", updated.username);
        let salt = updated.salt.as_deref().unwrap_or_default();
        grant(&updated, new_pin, salt)
    }
}

fn grant(account: &Account, pin: &str, salt: &[u8]) -> Result<VerifyResult> {
    Ok(VerifyResult::Granted(Session {
        owner_id: account.id,
        username: account.username.clone(),
        entry_key: EntryKey::derive(pin, salt)?,
    }))
}
