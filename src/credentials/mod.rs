//! OAuth2 credential records and where they come from.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       CredentialSource (trait)           │
//! │  - Lookup by fixed name                  │
//! │  - Returns a copy per record             │
//! └─────────────────────────────────────────┘
//!          ↑                    ↑
//! ┌──────────────────┐  ┌──────────────────┐
//! │ CredentialStore  │  │ host-provided    │
//! │ (SQLite, AES-GCM)│  │ implementations  │
//! └──────────────────┘  └──────────────────┘
//! ```
//!
//! The core only ever reads from a source. Tokens refreshed during an
//! execution live in the record's in-memory copy and are dropped with it.
//!
//! # Usage
//!
//! ```no_run
//! use smarthttp::credentials::{CredentialSource, CredentialStore, OAuthCredential};
//!
//! # fn main() -> anyhow::Result<()> {
//! let encryption_key = std::env::var("SMARTHTTP_ENCRYPTION_KEY")?;
//! let store = CredentialStore::new("credentials.db", &encryption_key)?;
//!
//! let mut credential = OAuthCredential::new("client", "secret", "https://auth.example.com");
//! credential.access_token = "access".to_string();
//! credential.refresh_token = Some("refresh".to_string());
//! store.store("oAuth2ApiEnhanced", &credential)?;
//!
//! if let Some(loaded) = store.load("oAuth2ApiEnhanced")? {
//!     println!("Token type: {}", loaded.token_type);
//! }
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

mod encryption;
mod storage;

pub use encryption::{decrypt, encrypt, validate_key};
pub use storage::CredentialStore;

/// Name the node looks its credential up under.
pub const DEFAULT_CREDENTIAL_NAME: &str = "oAuth2ApiEnhanced";

pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";
pub const DEFAULT_REFRESH_BUFFER_SECS: i64 = 300;
pub const DEFAULT_RETRY_ATTEMPTS: i64 = 3;
pub const DEFAULT_RETRY_DELAY_MS: i64 = 1000;

const RETRY_ATTEMPTS_RANGE: (i64, i64) = (0, 10);
const RETRY_DELAY_RANGE_MS: (i64, i64) = (100, 30_000);

/// Read-only lookup of credential records by name.
///
/// Implemented by the host. Returning `Ok(None)` means nothing is stored
/// under the name; both that and `Err` fail the current record.
pub trait CredentialSource: Send + Sync {
    fn load(&self, name: &str) -> Result<Option<OAuthCredential>>;
}

/// OAuth2 credential with the refresh and retry settings that travel with it.
///
/// Field names serialize in camelCase, matching what workflow hosts store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthCredential {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub auth_url: String,

    /// Token endpoint. When absent, `${auth_url}/token` is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    #[serde(default)]
    pub access_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Expiry descriptor: absolute expiry computed from the last refresh.
    /// Absent if the token was never refreshed through this crate; read
    /// through [`OAuthCredential::expiry`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Token data as workflow hosts store it after an authorization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_token_data: Option<OAuthTokenData>,

    #[serde(default = "default_auto_refresh")]
    pub auto_refresh: bool,

    /// Seconds before `expires_at` at which the token counts as expiring.
    #[serde(default = "default_refresh_buffer", rename = "refreshBuffer")]
    pub refresh_buffer_secs: i64,

    /// Raw retry bound; read through [`OAuthCredential::retry_attempts`].
    #[serde(default = "default_retry_attempts", rename = "retryAttempts")]
    pub retry_attempts_raw: i64,

    /// Raw base delay in ms; read through [`OAuthCredential::retry_delay_ms`].
    #[serde(default = "default_retry_delay", rename = "retryDelay")]
    pub retry_delay_raw: i64,
}

/// Host-managed token data. Only `expires_at` is read; everything else is
/// carried through untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OAuthTokenData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_token_type() -> String {
    DEFAULT_TOKEN_TYPE.to_string()
}

fn default_auto_refresh() -> bool {
    true
}

fn default_refresh_buffer() -> i64 {
    DEFAULT_REFRESH_BUFFER_SECS
}

fn default_retry_attempts() -> i64 {
    DEFAULT_RETRY_ATTEMPTS
}

fn default_retry_delay() -> i64 {
    DEFAULT_RETRY_DELAY_MS
}

impl OAuthCredential {
    /// Credential with the given client settings and every other field at its
    /// default.
    pub fn new(client_id: &str, client_secret: &str, auth_url: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            auth_url: auth_url.to_string(),
            access_token_url: None,
            scope: None,
            access_token: String::new(),
            refresh_token: None,
            token_type: default_token_type(),
            expires_at: None,
            oauth_token_data: None,
            auto_refresh: default_auto_refresh(),
            refresh_buffer_secs: default_refresh_buffer(),
            retry_attempts_raw: default_retry_attempts(),
            retry_delay_raw: default_retry_delay(),
        }
    }

    /// Endpoint the refresh exchange is posted to.
    pub fn token_endpoint(&self) -> String {
        match &self.access_token_url {
            Some(url) if !url.is_empty() => url.clone(),
            _ => format!("{}/token", self.auth_url.trim_end_matches('/')),
        }
    }

    /// Value of the `Authorization` header for this credential.
    pub fn authorization_header(&self) -> String {
        let token_type = if self.token_type.is_empty() {
            DEFAULT_TOKEN_TYPE
        } else {
            self.token_type.as_str()
        };
        format!("{} {}", token_type, self.access_token)
    }

    /// Expiry of the current access token: `expiresAt`, else
    /// `oauthTokenData.expires_at`.
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expires_at.or_else(|| {
            self.oauth_token_data
                .as_ref()
                .and_then(|data| data.expires_at)
        })
    }

    /// Records the expiry of a newly issued token in both places it is read
    /// from.
    pub fn set_expiry(&mut self, expires_at: Option<DateTime<Utc>>) {
        self.expires_at = expires_at;
        if let Some(data) = self.oauth_token_data.as_mut() {
            data.expires_at = expires_at;
        }
    }

    /// Refresh buffer as a duration. Negative buffers count as zero; buffers
    /// too large to represent saturate.
    pub fn refresh_buffer(&self) -> Duration {
        Duration::try_seconds(self.refresh_buffer_secs.max(0)).unwrap_or(Duration::MAX)
    }

    /// Retry bound, clamped to `[0, 10]`.
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts_raw
            .clamp(RETRY_ATTEMPTS_RANGE.0, RETRY_ATTEMPTS_RANGE.1) as u32
    }

    /// Base backoff delay in milliseconds, clamped to `[100, 30000]`.
    pub fn retry_delay_ms(&self) -> u64 {
        self.retry_delay_raw
            .clamp(RETRY_DELAY_RANGE_MS.0, RETRY_DELAY_RANGE_MS.1) as u64
    }
}
