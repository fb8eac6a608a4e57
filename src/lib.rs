//! SmartHttp - OAuth2-aware HTTP calls with refresh and retry.
//!
//! The crate sits between a workflow host and the HTTP calls it makes on
//! behalf of input records. For every record it decides whether the cached
//! access token is still usable, refreshes it against the authorization
//! server when needed, and retries the call within a bounded budget.
//!
//! # Architecture
//!
//! ```text
//!        Host (parameters, credentials, transport)
//!                        ↓
//! ┌─────────────────────────────────────────┐
//! │       Node executor (node)               │
//! │  - Per-record parameters + credential    │
//! │  - Output shaping / continuation policy  │
//! └─────────────────────────────────────────┘
//!                        ↓
//! ┌─────────────────────────────────────────┐
//! │       Retry controller (retry)           │
//! │  - Attempt / refresh / backoff loop      │
//! │  - Wall-clock budget                     │
//! └─────────────────────────────────────────┘
//!          ↓                         ↓
//! ┌──────────────────┐   ┌──────────────────┐
//! │ Token lifecycle  │   │ HTTP capability  │
//! │ (oauth)          │   │ (http)           │
//! └──────────────────┘   └──────────────────┘
//! ```

pub mod config;
pub mod credentials;
pub mod error;
pub mod http;
pub mod node;
pub mod oauth;
pub mod retry;

#[cfg(test)]
mod test_support;

pub use credentials::{CredentialSource, CredentialStore, OAuthCredential};
pub use error::{NodeOperationError, SmartHttpError};
pub use http::{HttpCapability, HttpResponse, RequestFailure, RequestOptions};
pub use node::{ContinuationPolicy, ItemOutput, ParameterStore, SmartHttpNode};
pub use retry::{RetryController, RetryPolicy};
