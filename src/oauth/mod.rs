//! OAuth2 token lifecycle: expiry checks, the refresh exchange, and failure
//! classification.
//!
//! # Refresh exchange
//!
//! ```text
//! POST {accessTokenUrl | authUrl + "/token"}
//! Content-Type: application/x-www-form-urlencoded
//!
//! grant_type=refresh_token&refresh_token=..&client_id=..&client_secret=..
//! ```
//!
//! The exchange goes through the host's raw request primitive, never the
//! bearer-injecting one, since the access token being replaced is the one
//! that was rejected.

mod classify;
mod token_response;

pub use classify::{classify_error, is_rate_limited, ErrorClass};
pub use token_response::{OAuthErrorBody, TokenResponse};

use crate::credentials::OAuthCredential;
use crate::error::SmartHttpError;
use crate::http::{HttpCapability, HttpMethod, RequestBody, RequestFailure, RequestOptions};
use crate::retry::Clock;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// True iff the credential has an expiry and `now` is inside the refresh
/// buffer (or past expiry).
///
/// A credential without an expiry descriptor is never expiring: the token is
/// used as-is and only refreshed reactively after an auth failure.
pub fn is_expiring(credential: &OAuthCredential, now: DateTime<Utc>) -> bool {
    match credential.expiry() {
        Some(expires_at) => expires_at
            .checked_sub_signed(credential.refresh_buffer())
            .map_or(true, |threshold| now >= threshold),
        None => false,
    }
}

/// Builds the form-encoded refresh request for `credential`.
pub fn refresh_request(credential: &OAuthCredential, refresh_token: &str) -> RequestOptions {
    let mut form = BTreeMap::new();
    form.insert("grant_type".to_string(), "refresh_token".to_string());
    form.insert("refresh_token".to_string(), refresh_token.to_string());
    form.insert("client_id".to_string(), credential.client_id.clone());
    form.insert("client_secret".to_string(), credential.client_secret.clone());

    let mut options = RequestOptions::new(HttpMethod::Post, credential.token_endpoint())
        .with_header("Accept", "application/json")
        .with_header("Content-Type", "application/x-www-form-urlencoded");
    options.body = RequestBody::Form(form);
    options
}

/// Message for a failed refresh: the provider's OAuth2 error when the
/// response carries one, the transport message otherwise.
fn refresh_failure_message(failure: &RequestFailure) -> String {
    failure
        .response_body()
        .and_then(OAuthErrorBody::from_body)
        .map(|body| body.summary())
        .unwrap_or_else(|| failure.message().to_string())
}

/// Token lifecycle manager bound to a transport and a clock.
#[derive(Clone)]
pub struct TokenLifecycle {
    http: Arc<dyn HttpCapability>,
    clock: Arc<dyn Clock>,
}

impl TokenLifecycle {
    pub fn new(http: Arc<dyn HttpCapability>, clock: Arc<dyn Clock>) -> Self {
        Self { http, clock }
    }

    /// [`is_expiring`] against the injected clock.
    pub fn is_expiring(&self, credential: &OAuthCredential) -> bool {
        is_expiring(credential, self.clock.now())
    }

    /// Exchanges the refresh token for a new access token.
    ///
    /// The input is left untouched; the returned copy carries the new access
    /// token, the rotated refresh token (or the old one if the provider did
    /// not rotate it), the new expiry, and the provider's token type if sent.
    ///
    /// # Errors
    /// * [`SmartHttpError::NoRefreshToken`] - nothing to exchange
    /// * [`SmartHttpError::RefreshFailed`] - the exchange failed or the
    ///   provider response carried no access token
    pub async fn refresh(
        &self,
        credential: &OAuthCredential,
    ) -> Result<OAuthCredential, SmartHttpError> {
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(SmartHttpError::NoRefreshToken)?;

        let endpoint = credential.token_endpoint();
        info!(endpoint = %endpoint, "Refreshing OAuth token");

        let response = self
            .http
            .request(refresh_request(credential, refresh_token))
            .await
            .map_err(|failure| {
                warn!(
                    endpoint = %endpoint,
                    status = ?failure.status(),
                    error = %failure,
                    "Token refresh request failed"
                );
                SmartHttpError::RefreshFailed(refresh_failure_message(&failure))
            })?;

        let token = TokenResponse::from_provider(&response.payload())
            .map_err(SmartHttpError::RefreshFailed)?;

        let now = self.clock.now();
        let expires_at = token
            .expires_in
            .and_then(Duration::try_seconds)
            .and_then(|ttl| now.checked_add_signed(ttl));

        debug!(
            rotated_refresh_token = token.refresh_token.is_some(),
            expires_in = ?token.expires_in,
            "Token refresh response received"
        );

        let mut refreshed = credential.clone();
        refreshed.access_token = token.access_token;
        if let Some(rotated) = token.refresh_token {
            refreshed.refresh_token = Some(rotated);
        }
        refreshed.set_expiry(expires_at);
        if let Some(token_type) = token.token_type {
            refreshed.token_type = token_type;
        }

        info!(endpoint = %endpoint, "OAuth token refreshed successfully");
        Ok(refreshed)
    }
}
