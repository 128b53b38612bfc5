//! Credential primitives
//!
//! - Salted scheme: PBKDF2-HMAC-SHA256, 65,536 iterations, 256-bit output,
//!   16-byte random salt, stored base64
//! - Legacy scheme: single-round SHA-256 of the PIN, stored base64 (verify
//!   and migrate only, never written for new accounts)
//! - Entry key: same KDF over a domain-separated salt, so it can never be
//!   recovered from the stored credential hash

use crate::{Error, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;
use subtle::ConstantTimeEq;
use vaultguard_params::{KDF_ITERATIONS, KEY_LEN, SALT_LEN};
use zeroize::Zeroizing;

const ENTRY_KEY_DOMAIN: &[u8] = b"vaultguard:entry-key:v1";

/// Shortest accepted PIN for new credentials
pub const MIN_PIN_LENGTH: usize = 4;

/// Longest accepted PIN for new credentials
pub const MAX_PIN_LENGTH: usize = 8;

/// Generate a fresh random salt
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Derive raw key bytes from a PIN using PBKDF2-HMAC-SHA256.
pub fn derive_key_bytes(pin: &str, salt: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    if salt.is_empty() {
        return Err(Error::KeyDerivation("Salt must not be empty".to_string()));
    }

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::pbkdf2_hmac::<Sha256>(pin.as_bytes(), salt, KDF_ITERATIONS, &mut *key);
    Ok(key)
}

/// Legacy credential digest: base64(SHA-256(pin))
pub fn legacy_digest(pin: &str) -> String {
    let digest = Sha256::digest(pin.as_bytes());
    STANDARD.encode(digest)
}

/// Constant-time byte equality. Lengths are not secret.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// Validate a PIN before it becomes a stored credential (4-8 ASCII digits)
pub fn validate_new_pin(pin: &str) -> Result<()> {
    if pin.len() < MIN_PIN_LENGTH || pin.len() > MAX_PIN_LENGTH {
        return Err(Error::Validation(format!(
            "PIN must be {}-{} digits",
            MIN_PIN_LENGTH, MAX_PIN_LENGTH
        )));
    }
    if !pin.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::Validation("PIN must contain only digits".to_string()));
    }
    Ok(())
}

/// Salted credential ready to be stored
#[derive(Clone, PartialEq, Eq)]
pub struct SaltedCredential {
    /// base64 PBKDF2 output
    pub hash: String,
    /// Salt used for the derivation
    pub salt: Vec<u8>,
}

impl fmt::Debug for SaltedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaltedCredential").finish_non_exhaustive()
    }
}

impl SaltedCredential {
    /// Hash a PIN under a freshly generated salt
    pub fn new(pin: &str) -> Result<Self> {
        Self::with_salt(pin, &generate_salt())
    }

    /// Hash a PIN under a given salt
    pub fn with_salt(pin: &str, salt: &[u8]) -> Result<Self> {
        let key = derive_key_bytes(pin, salt)?;
        Ok(Self {
            hash: STANDARD.encode(&key[..]),
            salt: salt.to_vec(),
        })
    }

    /// Check `pin` against stored material in constant time.
    ///
    /// Malformed stored material is an error, not a silent mismatch.
    pub fn verify(pin: &str, stored_hash: &str, salt: &[u8]) -> Result<bool> {
        let expected = Zeroizing::new(
            STANDARD
                .decode(stored_hash.trim())
                .map_err(|e| Error::InvalidCredential(format!("credential hash is not base64: {}", e)))?,
        );
        let computed = derive_key_bytes(pin, salt)?;
        Ok(constant_time_eq(&computed[..], &expected))
    }
}

/// Key for the entry-store collaborator, bound to the authenticated PIN
#[derive(Clone)]
pub struct EntryKey(Zeroizing<[u8; KEY_LEN]>);

impl EntryKey {
    /// Derive from the entered PIN and the account salt
    pub fn derive(pin: &str, account_salt: &[u8]) -> Result<Self> {
        let mut salt = Vec::with_capacity(account_salt.len() + ENTRY_KEY_DOMAIN.len());
        salt.extend_from_slice(account_salt);
        salt.extend_from_slice(ENTRY_KEY_DOMAIN);
        Ok(Self(derive_key_bytes(pin, &salt)?))
    }

    /// Key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl PartialEq for EntryKey {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq(&self.0[..], &other.0[..])
    }
}

impl Eq for EntryKey {}

impl fmt::Debug for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EntryKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_digest_known_vector() {
        // SHA-256("1234")
        assert_eq!(
            legacy_digest("1234"),
            "A6xnQhbz4Vx2HuGl4lXwZ5U2I8iziLRFnhP5eNfIRvQ="
        );
    }

    #[test]
    fn test_salted_round_trip() {
        let cred = SaltedCredential::new("1234").unwrap();
        assert_eq!(cred.salt.len(), SALT_LEN);
        assert!(SaltedCredential::verify("1234", &cred.hash, &cred.salt).unwrap());
        assert!(!SaltedCredential::verify("1235", &cred.hash, &cred.salt).unwrap());
        assert!(!SaltedCredential::verify("", &cred.hash, &cred.salt).unwrap());
    }

    #[test]
    fn test_same_pin_different_salt() {
        let a = SaltedCredential::new("1234").unwrap();
        let b = SaltedCredential::new("1234").unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let salt = [7u8; SALT_LEN];
        let a = SaltedCredential::with_salt("2468", &salt).unwrap();
        let b = SaltedCredential::with_salt("2468", &salt).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_salt_rejected() {
        assert!(derive_key_bytes("1234", &[]).is_err());
    }

    #[test]
    fn test_malformed_hash_is_error() {
        let salt = generate_salt();
        assert!(matches!(
            SaltedCredential::verify("1234", "%%%not-base64%%%", &salt),
            Err(Error::InvalidCredential(_))
        ));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn test_entry_key_independent_of_credential_hash() {
        let salt = generate_salt();
        let cred = SaltedCredential::with_salt("1234", &salt).unwrap();
        let key = EntryKey::derive("1234", &salt).unwrap();
        assert_ne!(STANDARD.encode(key.as_bytes()), cred.hash);
        assert_eq!(key, EntryKey::derive("1234", &salt).unwrap());
        assert_ne!(key, EntryKey::derive("4321", &salt).unwrap());
        assert_eq!(format!("{:?}", key), "EntryKey(..)");
    }

    #[test]
    fn test_new_pin_validation() {
        assert!(validate_new_pin("1234").is_ok());
        assert!(validate_new_pin("12345678").is_ok());
        assert!(validate_new_pin("123").is_err());
        assert!(validate_new_pin("123456789").is_err());
        assert!(validate_new_pin("12ab").is_err());
        assert!(validate_new_pin("").is_err());
    }
}
