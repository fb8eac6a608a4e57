//! SmartHttp host - runs the node executor behind an HTTP API.
//!
//! The host supplies what the core leaves to its environment: an encrypted
//! credential store, a reqwest transport, node parameters taken from the
//! request body, and the continuation policy.
//!
//! # Architecture
//!
//! ```text
//!     Client (PUT credentials, POST executions)
//!                  ↓
//! ┌─────────────────────────────────────────┐
//! │       Host API (axum)                    │
//! │  - Credential CRUD                       │
//! │  - Execute node over input items         │
//! └─────────────────────────────────────────┘
//!          ↓                         ↓
//! ┌──────────────────┐   ┌──────────────────┐
//! │ CredentialStore  │   │ SmartHttpNode    │
//! │ (SQLite + AES)   │   │ + reqwest        │
//! └──────────────────┘   └──────────────────┘
//! ```

pub mod api;
