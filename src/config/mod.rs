use anyhow::{Context, Result};
use serde::Deserialize;

use crate::credentials::DEFAULT_CREDENTIAL_NAME;
use crate::node::ContinuationPolicy;
use crate::retry::{BackoffLimits, RetryConfig, RetryPolicy, DEFAULT_EXECUTION_TIMEOUT_MS};

/// Complete SmartHttp configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SmartHttpConfig {
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub node: NodeSettings,
}

/// Retry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    /// Used when a record does not set `autoRetry`
    #[serde(default = "default_auto_retry")]
    pub auto_retry: bool,
    /// Used when a record does not set `maxRetries`
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Per-record wall-clock budget (milliseconds)
    #[serde(default = "default_execution_timeout_ms")]
    pub execution_timeout_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_max_retry_after_ms")]
    pub max_retry_after_ms: u64,
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

fn default_auto_retry() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_execution_timeout_ms() -> u64 {
    DEFAULT_EXECUTION_TIMEOUT_MS
}

fn default_max_backoff_ms() -> u64 {
    BackoffLimits::default().max_backoff_ms
}

fn default_max_retry_after_ms() -> u64 {
    BackoffLimits::default().max_retry_after_ms
}

fn default_jitter_ms() -> u64 {
    BackoffLimits::default().jitter_ms
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            auto_retry: default_auto_retry(),
            max_retries: default_max_retries(),
            execution_timeout_ms: default_execution_timeout_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_retry_after_ms: default_max_retry_after_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            auto_retry: self.auto_retry,
            max_retries: self.max_retries,
        }
    }

    pub fn controller_config(&self) -> RetryConfig {
        RetryConfig {
            execution_timeout_ms: self.execution_timeout_ms,
            backoff: BackoffLimits {
                max_backoff_ms: self.max_backoff_ms,
                max_retry_after_ms: self.max_retry_after_ms,
                jitter_ms: self.jitter_ms,
            },
        }
    }
}

/// Node executor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NodeSettings {
    /// Name the credential is loaded under
    #[serde(default = "default_credential_name")]
    pub credential_name: String,
    /// Default continuation policy for executions that do not choose one
    #[serde(default)]
    pub continue_on_fail: bool,
}

fn default_credential_name() -> String {
    DEFAULT_CREDENTIAL_NAME.to_string()
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            credential_name: default_credential_name(),
            continue_on_fail: false,
        }
    }
}

impl NodeSettings {
    pub fn continuation(&self) -> ContinuationPolicy {
        ContinuationPolicy::from_continue_on_fail(self.continue_on_fail)
    }
}

impl SmartHttpConfig {
    /// Applies `SMARTHTTP_*` environment overrides on top of `self`.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(v) = lookup("SMARTHTTP_AUTO_RETRY") {
            self.retry.auto_retry = v
                .parse()
                .with_context(|| format!("SMARTHTTP_AUTO_RETRY must be true or false, got '{}'", v))?;
        }
        if let Some(v) = lookup("SMARTHTTP_MAX_RETRIES") {
            self.retry.max_retries = v
                .parse()
                .with_context(|| format!("SMARTHTTP_MAX_RETRIES must be an integer, got '{}'", v))?;
        }
        if let Some(v) = lookup("SMARTHTTP_EXECUTION_TIMEOUT_MS") {
            self.retry.execution_timeout_ms = v.parse().with_context(|| {
                format!("SMARTHTTP_EXECUTION_TIMEOUT_MS must be an integer, got '{}'", v)
            })?;
        }
        if let Some(v) = lookup("SMARTHTTP_CREDENTIAL_NAME") {
            self.node.credential_name = v;
        }
        if let Some(v) = lookup("SMARTHTTP_CONTINUE_ON_FAIL") {
            self.node.continue_on_fail = v.parse().with_context(|| {
                format!("SMARTHTTP_CONTINUE_ON_FAIL must be true or false, got '{}'", v)
            })?;
        }
        Ok(self)
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<SmartHttpConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: SmartHttpConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path))?;
    Ok(config)
}
