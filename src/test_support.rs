//! Scripted transport and controllable time for unit tests.

use crate::credentials::{CredentialSource, OAuthCredential};
use crate::http::{HttpCapability, HttpResponse, RequestFailure, RequestOptions};
use crate::retry::{Clock, Jitter, Sleeper, Timing};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type Outcome = Result<HttpResponse, RequestFailure>;

/// Which transport primitive a call went through.
#[derive(Clone, Debug, PartialEq)]
pub enum CallKind {
    Raw,
    Authenticated(String),
}

#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub options: RequestOptions,
}

/// Transport answering from two queues: one for authenticated data calls and
/// one for raw calls (the token exchange).
#[derive(Default)]
pub struct ScriptedHttp {
    data: Mutex<VecDeque<Outcome>>,
    token: Mutex<VecDeque<Outcome>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedHttp {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_data(&self, outcome: Outcome) -> &Self {
        self.data.lock().unwrap().push_back(outcome);
        self
    }

    pub fn push_token(&self, outcome: Outcome) -> &Self {
        self.token.lock().unwrap().push_back(outcome);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn data_calls(&self) -> Vec<RequestOptions> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c.kind, CallKind::Authenticated(_)))
            .map(|c| c.options)
            .collect()
    }

    pub fn token_calls(&self) -> Vec<RequestOptions> {
        self.calls()
            .into_iter()
            .filter(|c| c.kind == CallKind::Raw)
            .map(|c| c.options)
            .collect()
    }

    fn record(&self, kind: CallKind, options: RequestOptions) {
        self.calls.lock().unwrap().push(RecordedCall { kind, options });
    }
}

#[async_trait]
impl HttpCapability for ScriptedHttp {
    async fn request(&self, options: RequestOptions) -> Outcome {
        self.record(CallKind::Raw, options);
        self.token
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(RequestFailure::new("no scripted token response")))
    }

    async fn request_with_authentication(
        &self,
        credential_type: &str,
        options: RequestOptions,
    ) -> Outcome {
        self.record(CallKind::Authenticated(credential_type.to_string()), options);
        self.data
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(RequestFailure::new("no scripted data response")))
    }
}

/// Transport whose calls never complete. Counts how many were started.
#[derive(Default)]
pub struct StalledHttp {
    started: Mutex<u32>,
}

impl StalledHttp {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn started(&self) -> u32 {
        *self.started.lock().unwrap()
    }
}

#[async_trait]
impl HttpCapability for StalledHttp {
    async fn request(&self, _options: RequestOptions) -> Outcome {
        *self.started.lock().unwrap() += 1;
        std::future::pending().await
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now),
        })
    }

    /// 2024-01-01T00:00:00Z.
    pub fn fixed() -> Arc<Self> {
        Self::at(epoch())
    }

    pub fn advance(&self, delay: Duration) {
        let mut now = self.now.lock().unwrap();
        *now = *now + ChronoDuration::from_std(delay).unwrap();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub struct NoJitter;

impl Jitter for NoJitter {
    fn jitter_ms(&self, _upper_ms: u64) -> u64 {
        0
    }
}

/// Records requested delays and moves the manual clock forward instead of
/// waiting.
pub struct RecordingSleeper {
    clock: Arc<ManualClock>,
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new(clock: Arc<ManualClock>) -> Arc<Self> {
        Arc::new(Self {
            clock,
            delays: Mutex::new(Vec::new()),
        })
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, delay: Duration) {
        self.delays.lock().unwrap().push(delay);
        self.clock.advance(delay);
    }
}

/// Deterministic timing: manual clock, no jitter, instant sleeps.
pub fn manual_timing() -> (Timing, Arc<ManualClock>, Arc<RecordingSleeper>) {
    let clock = ManualClock::fixed();
    let sleeper = RecordingSleeper::new(clock.clone());
    let timing = Timing {
        clock: clock.clone(),
        jitter: Arc::new(NoJitter),
        sleeper: sleeper.clone(),
    };
    (timing, clock, sleeper)
}

/// Credential source backed by a single in-memory record.
pub struct StaticCredentials {
    name: String,
    credential: Option<OAuthCredential>,
}

impl StaticCredentials {
    pub fn new(name: &str, credential: OAuthCredential) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            credential: Some(credential),
        })
    }

    pub fn empty() -> Arc<Self> {
        Arc::new(Self {
            name: String::new(),
            credential: None,
        })
    }
}

impl CredentialSource for StaticCredentials {
    fn load(&self, name: &str) -> anyhow::Result<Option<OAuthCredential>> {
        if name == self.name {
            Ok(self.credential.clone())
        } else {
            Ok(None)
        }
    }
}

/// Credential source whose backend is down.
pub struct BrokenCredentials;

impl CredentialSource for BrokenCredentials {
    fn load(&self, _name: &str) -> anyhow::Result<Option<OAuthCredential>> {
        anyhow::bail!("database is locked")
    }
}
