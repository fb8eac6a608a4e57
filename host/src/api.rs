//! Host HTTP API.
//!
//! Exposes four routes:
//! - `PUT /api/credentials/:name` — store (or replace) a credential record
//! - `GET /api/credentials` — list stored credential names
//! - `DELETE /api/credentials/:name` — remove a credential record
//! - `POST /api/execute` — run the node over a batch of input items

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smarthttp::config::SmartHttpConfig;
use smarthttp::node::StaticParameters;
use smarthttp::retry::Timing;
use smarthttp::{
    ContinuationPolicy, CredentialStore, HttpCapability, ItemOutput, NodeOperationError,
    OAuthCredential, SmartHttpNode,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared state for the host API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub credential_store: Arc<CredentialStore>,
    pub http: Arc<dyn HttpCapability>,
    pub config: Arc<SmartHttpConfig>,
    pub timing: Timing,
}

/// One input item of an execution.
#[derive(Debug, Default, Deserialize)]
pub struct ExecuteItem {
    /// Item payload, passed through untouched.
    #[serde(default)]
    pub json: Value,
    /// Parameter overrides for this item only.
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

/// Request body for `POST /api/execute`.
#[derive(Debug, Default, Deserialize)]
pub struct ExecuteRequest {
    /// Overrides `[node] continue_on_fail` for this execution.
    #[serde(default)]
    pub continue_on_fail: Option<bool>,
    /// Node-level parameters shared by every item.
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub items: Vec<ExecuteItem>,
}

/// Response for `POST /api/execute`.
#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub results: Vec<ItemOutput>,
}

/// Response for `GET /api/credentials`.
#[derive(Debug, Serialize)]
pub struct CredentialListResponse {
    pub credentials: Vec<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct ItemErrorResponse {
    error: String,
    item: usize,
}

// ---------------------------------------------------------------------------
// Business logic (called from HTTP handlers and unit tests)
// ---------------------------------------------------------------------------

/// Stores a credential record under `name`, replacing any previous one.
pub fn handle_store_credential(
    state: &ApiState,
    name: &str,
    credential: &OAuthCredential,
) -> Result<()> {
    if name.trim().is_empty() {
        anyhow::bail!("Credential name must not be empty");
    }
    state.credential_store.store(name, credential)?;
    info!(name = %name, "Credential stored");
    Ok(())
}

/// Removes a credential record. Returns `false` when nothing was stored.
pub fn handle_delete_credential(state: &ApiState, name: &str) -> Result<bool> {
    let removed = state.credential_store.delete(name)?;
    if removed {
        info!(name = %name, "Credential deleted");
    }
    Ok(removed)
}

/// Runs the node over `req.items`.
///
/// Node settings come from the host configuration; the request only chooses
/// parameters and, optionally, the continuation policy.
pub async fn handle_execute(
    state: &ApiState,
    req: ExecuteRequest,
) -> Result<Vec<ItemOutput>, NodeOperationError> {
    let execution_id = uuid::Uuid::new_v4();
    let continuation = match req.continue_on_fail {
        Some(flag) => ContinuationPolicy::from_continue_on_fail(flag),
        None => state.config.node.continuation(),
    };

    let mut params = StaticParameters::new(req.parameters);
    let mut items = Vec::with_capacity(req.items.len());
    for (index, item) in req.items.into_iter().enumerate() {
        if !item.parameters.is_empty() {
            params = params.with_item(index, item.parameters);
        }
        items.push(item.json);
    }

    info!(
        execution_id = %execution_id,
        items = items.len(),
        continuation = ?continuation,
        "Execution started"
    );

    let node = SmartHttpNode::new(state.http.clone(), state.credential_store.clone())
        .with_timing(state.timing.clone())
        .with_retry_config(state.config.retry.controller_config())
        .with_default_policy(state.config.retry.policy())
        .with_credential_name(state.config.node.credential_name.clone())
        .with_continuation(continuation);

    let result = node.execute(&items, &params).await;
    match &result {
        Ok(outputs) => {
            let failed = outputs.iter().filter(|o| !o.is_success()).count();
            info!(
                execution_id = %execution_id,
                items = outputs.len(),
                failed,
                "Execution finished"
            );
        }
        Err(e) => {
            warn!(
                execution_id = %execution_id,
                item = e.item_index,
                error = %e,
                "Execution aborted"
            );
        }
    }
    result
}

// ---------------------------------------------------------------------------
// HTTP handlers
// ---------------------------------------------------------------------------

async fn put_credential(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
    Json(credential): Json<OAuthCredential>,
) -> Result<StatusCode, AppError> {
    if name.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Credential name must not be empty".to_string(),
        ));
    }
    handle_store_credential(&state, &name, &credential).map_err(AppError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_credentials(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<CredentialListResponse>, AppError> {
    let credentials = state.credential_store.list_names().map_err(AppError::from)?;
    Ok(Json(CredentialListResponse { credentials }))
}

async fn delete_credential(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
) -> Result<StatusCode, AppError> {
    if handle_delete_credential(&state, &name).map_err(AppError::from)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Credential '{}' not found", name)))
    }
}

async fn post_execute(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<ExecuteRequest>,
) -> Result<Json<ExecuteResponse>, AppError> {
    let results = handle_execute(&state, req).await?;
    Ok(Json(ExecuteResponse { results }))
}

// ---------------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------------

enum AppError {
    BadRequest(String),
    NotFound(String),
    /// A record failed under the stop policy.
    Item { error: String, item: usize },
    Internal(String),
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<NodeOperationError> for AppError {
    fn from(e: NodeOperationError) -> Self {
        AppError::Item {
            error: e.to_string(),
            item: e.item_index,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::Item { error, item } => {
                return (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(ItemErrorResponse { error, item }),
                )
                    .into_response();
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/credentials", get(list_credentials))
        .route(
            "/api/credentials/:name",
            put(put_credential).delete(delete_credential),
        )
        .route("/api/execute", post(post_execute))
        .with_state(Arc::new(state))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
