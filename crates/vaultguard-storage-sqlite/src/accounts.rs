//! `users` table access

use crate::timestamp::{format_timestamp, parse_timestamp};
use crate::{Database, Error, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use rusqlite::types::ValueRef;
use rusqlite::{params, OptionalExtension, Row};
use vaultguard_core::{Account, NewAccount};

const ACCOUNT_COLUMNS: &str = "id, username, pin_hash, salt, locked_until";

/// Account storage over a borrowed connection
pub struct AccountStorage<'a> {
    db: &'a Database,
}

impl<'a> AccountStorage<'a> {
    /// Create account storage
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Look up by username
    pub fn get_by_username(&self, username: &str) -> Result<Option<Account>> {
        Ok(self
            .db
            .conn()
            .query_row(
                &format!("SELECT {} FROM users WHERE username = ?1", ACCOUNT_COLUMNS),
                params![username],
                row_to_account,
            )
            .optional()?)
    }

    /// Look up by id
    pub fn get_by_id(&self, id: i64) -> Result<Option<Account>> {
        Ok(self
            .db
            .conn()
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", ACCOUNT_COLUMNS),
                params![id],
                row_to_account,
            )
            .optional()?)
    }

    /// Number of accounts
    pub fn count(&self) -> Result<u64> {
        let count: i64 = self
            .db
            .conn()
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    /// Insert, returning the new id
    pub fn insert(&self, account: &NewAccount) -> Result<i64> {
        self.db.conn().execute(
            "INSERT INTO users (username, pin_hash, salt) VALUES (?1, ?2, ?3)",
            params![account.username, account.credential_hash, account.salt],
        )?;
        Ok(self.db.conn().last_insert_rowid())
    }

    /// Replace credential hash and salt in one statement
    pub fn update_credentials(&self, account: &Account) -> Result<()> {
        let updated = self.db.conn().execute(
            "UPDATE users SET pin_hash = ?1, salt = ?2 WHERE id = ?3",
            params![account.credential_hash, account.salt, account.id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("account {}", account.id)));
        }
        Ok(())
    }

    /// Set or clear the lock deadline
    pub fn set_locked_until(&self, id: i64, until: Option<DateTime<Utc>>) -> Result<()> {
        let updated = self.db.conn().execute(
            "UPDATE users SET locked_until = ?1 WHERE id = ?2",
            params![until.map(format_timestamp), id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("account {}", id)));
        }
        Ok(())
    }

    /// Current lock deadline. An unreadable value is an error.
    pub fn locked_until(&self, id: i64) -> Result<Option<DateTime<Utc>>> {
        let raw: Option<String> = self
            .db
            .conn()
            .query_row("SELECT locked_until FROM users WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("account {}", id)))?;

        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => parse_timestamp(text)
                .map(Some)
                .ok_or_else(|| Error::Corrupt(format!("locked_until for account {}", id))),
        }
    }
}

fn row_to_account(row: &Row<'_>) -> rusqlite::Result<Account> {
    // Older installs stored the salt as base64 text
    let salt = match row.get_ref(3)? {
        ValueRef::Null => None,
        ValueRef::Blob(bytes) => Some(bytes.to_vec()),
        ValueRef::Text(text) => Some(decode_text_salt(text)),
        _ => None,
    };
    let locked_until: Option<String> = row.get(4)?;

    Ok(Account {
        id: row.get(0)?,
        username: row.get(1)?,
        credential_hash: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        salt: salt.filter(|s| !s.is_empty()),
        locked_until: locked_until.as_deref().and_then(parse_timestamp),
    })
}

fn decode_text_salt(text: &[u8]) -> Vec<u8> {
    let trimmed = text.trim_ascii();
    BASE64.decode(trimmed).unwrap_or_else(|_| trimmed.to_vec())
}
