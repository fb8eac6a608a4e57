//! Time and randomness sources used by the retry controller.
//!
//! Injected so the controller can be driven deterministically in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// Wall clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Source of backoff jitter.
pub trait Jitter: Send + Sync {
    /// A value in `[0, upper_ms)`; `0` when `upper_ms` is `0`.
    fn jitter_ms(&self, upper_ms: u64) -> u64;
}

/// Suspends the current record between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RandomJitter;

impl Jitter for RandomJitter {
    fn jitter_ms(&self, upper_ms: u64) -> u64 {
        if upper_ms == 0 {
            return 0;
        }
        rand::thread_rng().gen_range(0..upper_ms)
    }
}

/// Sleeps on the tokio timer; other tasks keep running meanwhile.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// The three injected sources, bundled.
#[derive(Clone)]
pub struct Timing {
    pub clock: Arc<dyn Clock>,
    pub jitter: Arc<dyn Jitter>,
    pub sleeper: Arc<dyn Sleeper>,
}

impl Timing {
    /// System clock, thread-local RNG, tokio timer.
    pub fn system() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            jitter: Arc::new(RandomJitter),
            sleeper: Arc::new(TokioSleeper),
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self::system()
    }
}
