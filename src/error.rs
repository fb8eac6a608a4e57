//! Error kinds surfaced by the token lifecycle, the retry controller and the
//! node executor.

use crate::http::RequestFailure;
use thiserror::Error;

/// Failure of a single input record.
///
/// None of these are retried by the controller except [`SmartHttpError::Auth`]
/// while attempts remain; once one of them leaves the controller it is final
/// for the record.
#[derive(Debug, Error)]
pub enum SmartHttpError {
    /// A refresh was needed but the credential carries no refresh token.
    #[error("No refresh token available for token refresh")]
    NoRefreshToken,

    /// The refresh exchange with the authorization server failed.
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// The call failed with an auth-classified error and no attempts remain.
    #[error("{0}")]
    Auth(RequestFailure),

    /// The call failed with an error that is never retried (or retries ran out).
    #[error("{0}")]
    Request(RequestFailure),

    /// The per-record wall-clock budget ran out.
    #[error("Execution timed out after {elapsed_ms}ms (limit {limit_ms}ms)")]
    TimeoutExceeded { elapsed_ms: u64, limit_ms: u64 },

    /// The credential source failed or has no record under the name.
    #[error("Credentials unavailable: {0}")]
    CredentialUnavailable(String),

    /// A record parameter is missing or malformed.
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },
}

impl SmartHttpError {
    /// Short machine-readable kind, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            SmartHttpError::NoRefreshToken => "no_refresh_token",
            SmartHttpError::RefreshFailed(_) => "refresh_failed",
            SmartHttpError::Auth(_) => "auth",
            SmartHttpError::Request(_) => "request",
            SmartHttpError::TimeoutExceeded { .. } => "timeout",
            SmartHttpError::CredentialUnavailable(_) => "credentials",
            SmartHttpError::InvalidParameter { .. } => "invalid_parameter",
        }
    }

    pub(crate) fn invalid_parameter(name: &str, reason: impl Into<String>) -> Self {
        SmartHttpError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Fatal error for a whole execution under the stop-on-first-failure policy.
///
/// Carries the index of the record that failed. The message is the message of
/// the underlying [`SmartHttpError`].
#[derive(Debug, Error)]
#[error("{error}")]
pub struct NodeOperationError {
    pub item_index: usize,
    pub error: SmartHttpError,
}
