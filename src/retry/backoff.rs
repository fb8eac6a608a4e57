//! Delay between attempts.

use super::clock::Jitter;
use crate::http::RequestFailure;
use crate::oauth::is_rate_limited;
use std::time::Duration;

/// Bounds applied to every computed delay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffLimits {
    /// Cap for the exponential part.
    pub max_backoff_ms: u64,
    /// Cap for server-provided `retry-after` waits.
    pub max_retry_after_ms: u64,
    /// Jitter is drawn from `[0, jitter_ms)`.
    pub jitter_ms: u64,
}

impl Default for BackoffLimits {
    fn default() -> Self {
        Self {
            max_backoff_ms: 10_000,
            max_retry_after_ms: 30_000,
            jitter_ms: 250,
        }
    }
}

/// Parses a `retry-after` value given in whole seconds.
///
/// HTTP-date values are not honoured and fall back to exponential backoff.
pub fn parse_retry_after(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}

/// Computes the wait before the next attempt.
///
/// A 429 carrying a numeric `retry-after` waits exactly that long, capped at
/// `max_retry_after_ms`. Otherwise the wait is
/// `min(base_delay_ms * 2^attempt_index, max_backoff_ms)` plus jitter.
pub fn backoff_delay(
    failure: Option<&RequestFailure>,
    attempt_index: u32,
    base_delay_ms: u64,
    limits: &BackoffLimits,
    jitter: &dyn Jitter,
) -> Duration {
    let retry_after = failure
        .filter(|f| is_rate_limited(f))
        .and_then(|f| f.header("retry-after"))
        .and_then(parse_retry_after);

    if let Some(secs) = retry_after {
        let millis = secs.saturating_mul(1000).min(limits.max_retry_after_ms);
        return Duration::from_millis(millis);
    }

    let factor = 1u64.checked_shl(attempt_index).unwrap_or(u64::MAX);
    let exponential = base_delay_ms
        .saturating_mul(factor)
        .min(limits.max_backoff_ms);
    Duration::from_millis(exponential + jitter.jitter_ms(limits.jitter_ms))
}
