//! Failure classification: auth-retryable vs. everything else.

use crate::http::RequestFailure;

const AUTH_STATUSES: [u16; 2] = [401, 403];
const AUTH_CODES: [&str; 2] = ["OAUTH_TOKEN_EXPIRED", "UNAUTHORIZED"];
const AUTH_ERROR_NAME: &str = "AuthenticationError";
const AUTH_MESSAGE_MARKERS: [&str; 4] = [
    "unauthorized",
    "authentication",
    "token expired",
    "invalid token",
];
const RATE_LIMITED_STATUS: u16 = 429;

/// How a failed call should be treated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// The access token was rejected; refresh and retry.
    Auth,
    Other,
}

/// Classifies a failure.
///
/// Checked in order: status (401/403), error code, error name, and only then
/// the message text. Structured signals always win over the message.
pub fn classify_error(failure: &RequestFailure) -> ErrorClass {
    if failure.statuses().any(|s| AUTH_STATUSES.contains(&s)) {
        return ErrorClass::Auth;
    }
    if failure
        .code
        .as_deref()
        .is_some_and(|code| AUTH_CODES.contains(&code))
    {
        return ErrorClass::Auth;
    }
    if failure.name.as_deref() == Some(AUTH_ERROR_NAME) {
        return ErrorClass::Auth;
    }

    let message = failure.message.as_deref().unwrap_or_default().to_lowercase();
    if AUTH_MESSAGE_MARKERS.iter().any(|m| message.contains(m)) {
        ErrorClass::Auth
    } else {
        ErrorClass::Other
    }
}

/// True when the failure is an HTTP 429.
pub fn is_rate_limited(failure: &RequestFailure) -> bool {
    failure.statuses().any(|s| s == RATE_LIMITED_STATUS)
}
