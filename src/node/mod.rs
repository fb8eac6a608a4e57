//! Node executor: runs the retry controller once per input record and shapes
//! the per-record output.

mod params;

pub use params::{BodyMode, ItemParameters, ParameterStore, StaticParameters};

use crate::credentials::{CredentialSource, OAuthCredential, DEFAULT_CREDENTIAL_NAME};
use crate::error::{NodeOperationError, SmartHttpError};
use crate::http::{HttpCapability, HttpResponse};
use crate::retry::{AttemptFailure, AttemptSuccess, RetryConfig, RetryController, RetryPolicy, Timing};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What happens to the execution when a record fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContinuationPolicy {
    /// Abort with a [`NodeOperationError`] tagged with the record index.
    #[default]
    Stop,
    /// Emit an error-shaped output and move on to the next record.
    Continue,
}

impl ContinuationPolicy {
    pub fn from_continue_on_fail(continue_on_fail: bool) -> Self {
        if continue_on_fail {
            ContinuationPolicy::Continue
        } else {
            ContinuationPolicy::Stop
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessOutput {
    pub status_code: u16,
    pub body: Value,
    pub headers: BTreeMap<String, String>,
    pub retry_attempt: u32,
}

impl SuccessOutput {
    /// Status defaults to 200, body to the raw response, headers to empty.
    pub fn from_response(response: HttpResponse, retry_attempt: u32) -> Self {
        let body = response.payload();
        Self {
            status_code: response.status_code.unwrap_or(200),
            body,
            headers: response.headers.unwrap_or_default(),
            retry_attempt,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureOutput {
    pub error: String,
    pub item: usize,
    pub attempts: u32,
}

/// One output record per input record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemOutput {
    Success(SuccessOutput),
    Failure(FailureOutput),
}

impl ItemOutput {
    pub fn is_success(&self) -> bool {
        matches!(self, ItemOutput::Success(_))
    }
}

/// The executor, wired to the host's transport and credential source.
#[derive(Clone)]
pub struct SmartHttpNode {
    http: Arc<dyn HttpCapability>,
    credentials: Arc<dyn CredentialSource>,
    timing: Timing,
    retry_config: RetryConfig,
    default_policy: RetryPolicy,
    credential_name: String,
    continuation: ContinuationPolicy,
}

impl SmartHttpNode {
    pub fn new(http: Arc<dyn HttpCapability>, credentials: Arc<dyn CredentialSource>) -> Self {
        Self {
            http,
            credentials,
            timing: Timing::system(),
            retry_config: RetryConfig::default(),
            default_policy: RetryPolicy::default(),
            credential_name: DEFAULT_CREDENTIAL_NAME.to_string(),
            continuation: ContinuationPolicy::default(),
        }
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Retry switches used when a record does not set `autoRetry` /
    /// `maxRetries`.
    pub fn with_default_policy(mut self, policy: RetryPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    /// Name the credential is loaded under. Also passed to the transport as
    /// the credential type.
    pub fn with_credential_name(mut self, name: impl Into<String>) -> Self {
        self.credential_name = name.into();
        self
    }

    pub fn with_continuation(mut self, continuation: ContinuationPolicy) -> Self {
        self.continuation = continuation;
        self
    }

    /// Processes `items` in order, one record at a time.
    ///
    /// Returns one output per record. Under [`ContinuationPolicy::Stop`] the
    /// first failing record aborts the execution and outputs of earlier
    /// records are dropped.
    pub async fn execute(
        &self,
        items: &[Value],
        params: &dyn ParameterStore,
    ) -> Result<Vec<ItemOutput>, NodeOperationError> {
        let controller = RetryController::new(self.http.clone(), self.timing.clone())
            .with_config(self.retry_config)
            .with_credential_type(self.credential_name.clone());

        info!(items = items.len(), continuation = ?self.continuation, "Executing node");

        let mut outputs = Vec::with_capacity(items.len());
        for index in 0..items.len() {
            match self.execute_item(&controller, index, params).await {
                Ok(success) => {
                    debug!(
                        item = index,
                        retry_attempt = success.retry_attempt,
                        "Item succeeded"
                    );
                    outputs.push(ItemOutput::Success(SuccessOutput::from_response(
                        success.response,
                        success.retry_attempt,
                    )));
                }
                Err(failure) => match self.continuation {
                    ContinuationPolicy::Continue => {
                        warn!(
                            item = index,
                            attempts = failure.attempts,
                            error = %failure.error,
                            "Item failed, continuing"
                        );
                        outputs.push(ItemOutput::Failure(FailureOutput {
                            error: failure.error.to_string(),
                            item: index,
                            attempts: failure.attempts,
                        }));
                    }
                    ContinuationPolicy::Stop => {
                        warn!(item = index, error = %failure.error, "Item failed, stopping");
                        return Err(NodeOperationError {
                            item_index: index,
                            error: failure.error,
                        });
                    }
                },
            }
        }

        Ok(outputs)
    }

    async fn execute_item(
        &self,
        controller: &RetryController,
        index: usize,
        params: &dyn ParameterStore,
    ) -> Result<AttemptSuccess, AttemptFailure> {
        let parameters = ItemParameters::read(params, index).map_err(not_attempted)?;
        let credential = self.load_credential().map_err(not_attempted)?;
        let request = parameters.to_request();
        let policy = parameters.retry_policy(self.default_policy);

        debug!(
            item = index,
            method = %request.method,
            url = %request.url,
            body_mode = ?parameters.body_mode,
            "Executing item"
        );

        controller.run(credential, &request, &policy).await
    }

    /// Fresh copy per record; refreshed tokens never leak into the next one.
    fn load_credential(&self) -> Result<OAuthCredential, SmartHttpError> {
        match self.credentials.load(&self.credential_name) {
            Ok(Some(credential)) => Ok(credential),
            Ok(None) => Err(SmartHttpError::CredentialUnavailable(format!(
                "no credential named '{}'",
                self.credential_name
            ))),
            Err(e) => Err(SmartHttpError::CredentialUnavailable(format!("{:#}", e))),
        }
    }
}

fn not_attempted(error: SmartHttpError) -> AttemptFailure {
    AttemptFailure { error, attempts: 0 }
}
