//! Per-record attempt loop: proactive refresh, reactive refresh on auth
//! failures, bounded exponential backoff and a wall-clock budget.
//!
//! # State machine
//!
//! ```text
//!  Ready ──(expiring)──> Refreshing ──> Attempting
//!    │                                     │
//!    └────────────────> Attempting <───────┤
//!                          │               │
//!          ┌───────────────┼──────────────┐│
//!          ↓               ↓              ↓│
//!      Succeeded   Refreshing(auth)   Backoff(429)
//!                          │              ↑
//!                          └──────────────┘
//!
//!  Anything unretryable, out of attempts or out of time ──> Exhausted
//! ```
//!
//! The budget runs from the start of the record, proactive refresh included.
//! It is checked on entry to `Attempting`. Any await still pending when it
//! runs out is abandoned.

mod backoff;
mod clock;

pub use backoff::{backoff_delay, parse_retry_after, BackoffLimits};
pub use clock::{Clock, Jitter, RandomJitter, Sleeper, SystemClock, Timing, TokioSleeper};

use crate::credentials::{OAuthCredential, DEFAULT_CREDENTIAL_NAME};
use crate::error::SmartHttpError;
use crate::http::{HttpCapability, HttpResponse, RequestFailure, RequestOptions};
use crate::oauth::{classify_error, is_rate_limited, ErrorClass, TokenLifecycle};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default per-record wall-clock budget.
pub const DEFAULT_EXECUTION_TIMEOUT_MS: u64 = 300_000;

/// Caller-side retry switches, read per record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub auto_retry: bool,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            auto_retry: true,
            max_retries: 3,
        }
    }
}

impl RetryPolicy {
    /// Total calls allowed for one record.
    ///
    /// `1` with auto-retry off, otherwise
    /// `min(max_retries, credential retry attempts) + 1`.
    pub fn max_attempts(&self, credential: &OAuthCredential) -> u32 {
        if !self.auto_retry {
            return 1;
        }
        self.max_retries.min(credential.retry_attempts()) + 1
    }
}

/// Controller-wide limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryConfig {
    pub execution_timeout_ms: u64,
    pub backoff: BackoffLimits,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            execution_timeout_ms: DEFAULT_EXECUTION_TIMEOUT_MS,
            backoff: BackoffLimits::default(),
        }
    }
}

/// Outcome of a record whose call eventually succeeded.
#[derive(Clone, Debug, PartialEq)]
pub struct AttemptSuccess {
    pub response: HttpResponse,
    /// Zero-based index of the attempt that succeeded.
    pub retry_attempt: u32,
}

/// Outcome of a record that gave up.
#[derive(Debug)]
pub struct AttemptFailure {
    pub error: SmartHttpError,
    /// Number of data calls actually made.
    pub attempts: u32,
}

#[derive(Debug)]
enum AttemptState {
    Ready,
    Attempting,
    /// `failure` is the rejected call for a reactive refresh, `None` for a
    /// proactive one.
    Refreshing { failure: Option<RequestFailure> },
    Backoff { failure: RequestFailure },
    Succeeded(HttpResponse),
    Exhausted(SmartHttpError),
}

/// Drives one record through the attempt loop.
#[derive(Clone)]
pub struct RetryController {
    http: Arc<dyn HttpCapability>,
    lifecycle: TokenLifecycle,
    timing: Timing,
    config: RetryConfig,
    credential_type: String,
}

impl RetryController {
    pub fn new(http: Arc<dyn HttpCapability>, timing: Timing) -> Self {
        let lifecycle = TokenLifecycle::new(http.clone(), timing.clock.clone());
        Self {
            http,
            lifecycle,
            timing,
            config: RetryConfig::default(),
            credential_type: DEFAULT_CREDENTIAL_NAME.to_string(),
        }
    }

    pub fn with_config(mut self, config: RetryConfig) -> Self {
        self.config = config;
        self
    }

    /// Credential type passed to the bearer-injecting transport primitive.
    pub fn with_credential_type(mut self, credential_type: impl Into<String>) -> Self {
        self.credential_type = credential_type.into();
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Runs `request` until it succeeds or the record is exhausted.
    ///
    /// The credential is owned by this call; tokens refreshed here are not
    /// visible to later records.
    pub async fn run(
        &self,
        credential: OAuthCredential,
        request: &RequestOptions,
        policy: &RetryPolicy,
    ) -> Result<AttemptSuccess, AttemptFailure> {
        let started = self.timing.clock.now();
        let max_attempts = policy.max_attempts(&credential);
        let mut credential = credential;
        let mut attempt_index: u32 = 0;
        let mut calls: u32 = 0;
        let mut state = AttemptState::Ready;

        debug!(
            method = %request.method,
            url = %request.url,
            max_attempts,
            "Starting request"
        );

        loop {
            state = match state {
                AttemptState::Ready => {
                    if credential.auto_refresh && self.lifecycle.is_expiring(&credential) {
                        info!("Access token expiring, refreshing before first attempt");
                        AttemptState::Refreshing { failure: None }
                    } else {
                        AttemptState::Attempting
                    }
                }

                AttemptState::Attempting => {
                    let elapsed_ms = self.elapsed_ms(started);
                    if elapsed_ms > self.config.execution_timeout_ms {
                        AttemptState::Exhausted(SmartHttpError::TimeoutExceeded {
                            elapsed_ms,
                            limit_ms: self.config.execution_timeout_ms,
                        })
                    } else {
                        let mut options = request.clone();
                        options.set_header("Authorization", credential.authorization_header());
                        calls += 1;
                        let call = self
                            .http
                            .request_with_authentication(&self.credential_type, options);
                        match self.within_budget(started, call).await {
                            Ok(Ok(response)) => AttemptState::Succeeded(response),
                            Ok(Err(failure)) => {
                                self.after_failure(failure, attempt_index, max_attempts)
                            }
                            Err(timeout) => AttemptState::Exhausted(timeout),
                        }
                    }
                }

                AttemptState::Refreshing { failure } => {
                    let refreshed = self
                        .within_budget(started, self.lifecycle.refresh(&credential))
                        .await;
                    match refreshed {
                        Ok(Ok(refreshed)) => {
                            credential = refreshed;
                            match failure {
                                Some(failure) => AttemptState::Backoff { failure },
                                None => AttemptState::Attempting,
                            }
                        }
                        Ok(Err(e)) | Err(e) => AttemptState::Exhausted(e),
                    }
                }

                AttemptState::Backoff { failure } => {
                    let delay = backoff_delay(
                        Some(&failure),
                        attempt_index,
                        credential.retry_delay_ms(),
                        &self.config.backoff,
                        self.timing.jitter.as_ref(),
                    );
                    info!(
                        attempt = attempt_index + 1,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure,
                        "Retrying request after backoff"
                    );
                    match self
                        .within_budget(started, self.timing.sleeper.sleep(delay))
                        .await
                    {
                        Ok(()) => {
                            attempt_index += 1;
                            AttemptState::Attempting
                        }
                        Err(timeout) => AttemptState::Exhausted(timeout),
                    }
                }

                AttemptState::Succeeded(response) => {
                    debug!(retry_attempt = attempt_index, "Request succeeded");
                    return Ok(AttemptSuccess {
                        response,
                        retry_attempt: attempt_index,
                    });
                }

                AttemptState::Exhausted(error) => {
                    warn!(
                        kind = error.kind(),
                        attempts = calls,
                        error = %error,
                        "Request failed"
                    );
                    return Err(AttemptFailure {
                        error,
                        attempts: calls,
                    });
                }
            };
        }
    }

    fn elapsed_ms(&self, started: DateTime<Utc>) -> u64 {
        (self.timing.clock.now() - started)
            .num_milliseconds()
            .max(0) as u64
    }

    /// Awaits `fut` for at most what is left of the record's budget.
    ///
    /// A suspension point that outlives the budget is dropped and reported
    /// as [`SmartHttpError::TimeoutExceeded`].
    async fn within_budget<T>(
        &self,
        started: DateTime<Utc>,
        fut: impl Future<Output = T>,
    ) -> Result<T, SmartHttpError> {
        let limit_ms = self.config.execution_timeout_ms;
        let remaining = Duration::from_millis(limit_ms.saturating_sub(self.elapsed_ms(started)));
        tokio::time::timeout(remaining, fut).await.map_err(|_| {
            SmartHttpError::TimeoutExceeded {
                elapsed_ms: self.elapsed_ms(started).max(limit_ms),
                limit_ms,
            }
        })
    }

    fn after_failure(
        &self,
        failure: RequestFailure,
        attempt_index: u32,
        max_attempts: u32,
    ) -> AttemptState {
        let retries_left = attempt_index + 1 < max_attempts;
        match classify_error(&failure) {
            ErrorClass::Auth if retries_left => {
                info!(error = %failure, "Authentication failed, refreshing token");
                AttemptState::Refreshing {
                    failure: Some(failure),
                }
            }
            ErrorClass::Auth => AttemptState::Exhausted(SmartHttpError::Auth(failure)),
            ErrorClass::Other if retries_left && is_rate_limited(&failure) => {
                AttemptState::Backoff { failure }
            }
            ErrorClass::Other => AttemptState::Exhausted(SmartHttpError::Request(failure)),
        }
    }
}
