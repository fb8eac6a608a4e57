//! Encrypted credential storage using SQLite.
//!
//! Each credential record is serialized to JSON and sealed as a whole, so
//! client secrets, access tokens and refresh tokens are all encrypted at rest.

use super::{encryption, CredentialSource, OAuthCredential};
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Encrypted credential storage backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE credentials (
///     name TEXT PRIMARY KEY,
///     record TEXT NOT NULL,      -- base64(nonce || AES-256-GCM ciphertext)
///     created_at TEXT NOT NULL,  -- RFC 3339
///     updated_at TEXT NOT NULL   -- RFC 3339
/// );
/// ```
pub struct CredentialStore {
    conn: Mutex<Connection>,
    encryption_key: Vec<u8>,
}

impl CredentialStore {
    /// Creates or opens a credential store.
    ///
    /// # Arguments
    /// * `db_path` - Path to SQLite database file (`":memory:"` for tests)
    /// * `encryption_key` - Base64-encoded 32-byte master key
    pub fn new<P: AsRef<Path>>(db_path: P, encryption_key: &str) -> Result<Self> {
        let encryption_key =
            encryption::validate_key(encryption_key).context("Invalid encryption key")?;

        let conn = Connection::open(db_path).context("Failed to open database")?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS credentials (
                name TEXT PRIMARY KEY,
                record TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )
        .context("Failed to create credentials table")?;

        Ok(Self {
            conn: Mutex::new(conn),
            encryption_key,
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Credential store lock poisoned"))
    }

    /// Stores a credential under `name`, replacing any existing record.
    pub fn store(&self, name: &str, credential: &OAuthCredential) -> Result<()> {
        let json = serde_json::to_vec(credential).context("Failed to serialize credential")?;
        let sealed = encryption::encrypt(&json, &self.encryption_key)
            .context("Failed to encrypt credential")?;
        let now = Utc::now().to_rfc3339();

        self.conn()?
            .execute(
                r#"
                INSERT INTO credentials (name, record, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?3)
                ON CONFLICT(name) DO UPDATE SET
                    record = excluded.record,
                    updated_at = excluded.updated_at
                "#,
                params![name, sealed, now],
            )
            .context("Failed to store credential")?;

        Ok(())
    }

    /// Retrieves and decrypts the credential stored under `name`.
    pub fn get(&self, name: &str) -> Result<Option<OAuthCredential>> {
        let sealed: Option<String> = self
            .conn()?
            .query_row(
                "SELECT record FROM credentials WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query credential")?;

        let Some(sealed) = sealed else {
            return Ok(None);
        };

        let json = encryption::decrypt(&sealed, &self.encryption_key)
            .context("Failed to decrypt credential")?;
        let credential =
            serde_json::from_slice(&json).context("Failed to parse stored credential")?;
        Ok(Some(credential))
    }

    /// Deletes the credential stored under `name`.
    ///
    /// # Returns
    /// * `Ok(true)` - A record was deleted
    /// * `Ok(false)` - Nothing was stored under the name
    pub fn delete(&self, name: &str) -> Result<bool> {
        let rows = self
            .conn()?
            .execute("DELETE FROM credentials WHERE name = ?1", params![name])
            .context("Failed to delete credential")?;
        Ok(rows > 0)
    }

    /// Lists stored credential names in alphabetical order.
    pub fn list_names(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT name FROM credentials ORDER BY name")
            .context("Failed to prepare query")?;
        let names = stmt
            .query_map([], |row| row.get(0))
            .context("Failed to list credentials")?
            .collect::<rusqlite::Result<Vec<String>>>()
            .context("Failed to read credential names")?;
        Ok(names)
    }
}

impl CredentialSource for CredentialStore {
    fn load(&self, name: &str) -> Result<Option<OAuthCredential>> {
        self.get(name)
    }
}
