//! Account provisioning

use crate::kdf::{self, SaltedCredential};
use crate::model::NewAccount;
use crate::store::CredentialStore;
use crate::{Error, Result};

/// Username created on first run
pub const DEFAULT_USERNAME: &str = "owner";

/// Create a salted account
pub fn provision_account(accounts: &dyn CredentialStore, username: &str, pin: &str) -> Result<i64> {
    validate_username(username)?;
    kdf::validate_new_pin(pin)?;

    let credential = SaltedCredential::new(pin)?;
    let id = accounts.insert_account(&NewAccount {
        username: username.to_string(),
        credential_hash: credential.hash,
        salt: Some(credential.salt),
    })?;
    tracing::info!("Provisioned account {} (id {})", username, id);
    Ok(id)
}

/// Create an account with the legacy unsalted digest, as older installs
/// stored it. It is upgraded on its first successful login.
pub fn provision_legacy_account(accounts: &dyn CredentialStore, username: &str, pin: &str) -> Result<i64> {
    validate_username(username)?;

    let id = accounts.insert_account(&NewAccount {
        username: username.to_string(),
        credential_hash: kdf::legacy_digest(pin),
        salt: None,
    })?;
    tracing::info!("Provisioned legacy account {} (id {})", username, id);
    Ok(id)
}

/// On an empty store, create [`DEFAULT_USERNAME`] with `initial_pin`.
/// Returns the new id, or `None` when accounts already exist.
pub fn ensure_default_account(accounts: &dyn CredentialStore, initial_pin: &str) -> Result<Option<i64>> {
    let count = accounts.account_count()?;
    if count > 0 {
        tracing::debug!("{} account(s) already provisioned", count);
        return Ok(None);
    }
    provision_account(accounts, DEFAULT_USERNAME, initial_pin).map(Some)
}

fn validate_username(username: &str) -> Result<()> {
    if username.trim().is_empty() {
        return Err(Error::Validation("username must not be empty".to_string()));
    }
    if username.trim() != username {
        return Err(Error::Validation(
            "username must not have leading or trailing whitespace".to_string(),
        ));
    }
    Ok(())
}
