//! HTTP capability supplied by the host.
//!
//! The core never talks to the network directly. Every outbound call (the
//! data request and the token refresh exchange) goes through an
//! [`HttpCapability`], which returns either an [`HttpResponse`] or a
//! structured [`RequestFailure`] the retry controller can classify.

mod client;

pub use client::ReqwestCapability;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Message used for failures that carry no message of their own.
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Transport primitive the host exposes to the core.
///
/// # Contract
/// - `request` performs the call as described by `options` and nothing else.
/// - `request_with_authentication` performs the same call on behalf of the
///   named credential type. The core always sets the `Authorization` header
///   itself before calling it, so implementations must not overwrite it. The
///   default implementation simply delegates to `request`.
#[async_trait]
pub trait HttpCapability: Send + Sync {
    async fn request(&self, options: RequestOptions) -> Result<HttpResponse, RequestFailure>;

    async fn request_with_authentication(
        &self,
        credential_type: &str,
        options: RequestOptions,
    ) -> Result<HttpResponse, RequestFailure> {
        let _ = credential_type;
        self.request(options).await
    }
}

/// HTTP method of an outbound call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        }
    }

    /// Parses a method name, case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "DELETE" => Some(HttpMethod::Delete),
            "PATCH" => Some(HttpMethod::Patch),
            _ => None,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body. Exactly one mode is active per request.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    /// Raw text; the content type travels in the headers.
    Raw(String),
    /// `application/x-www-form-urlencoded` fields.
    Form(BTreeMap<String, String>),
    /// `multipart/form-data` text fields.
    Multipart(BTreeMap<String, String>),
}

/// Options bag for a single outbound call.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestOptions {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: BTreeMap<String, String>,
    pub body: RequestBody,
    /// Default JSON envelope: the response body is decoded as JSON.
    pub json: bool,
}

impl RequestOptions {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: BTreeMap::new(),
            body: RequestBody::Empty,
            json: true,
        }
    }

    /// Builder-style [`RequestOptions::set_header`].
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    /// Sets a header, replacing any existing header of the same name
    /// regardless of case.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.remove_header(name);
        self.headers.insert(name.to_string(), value.into());
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|k, _| !k.eq_ignore_ascii_case(name));
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Successful response as handed back by the transport.
///
/// Full responses carry a status code, headers and body. Some hosts resolve
/// with the decoded payload only; fields they did not recognise end up in
/// `extra`, and [`HttpResponse::payload`] then returns the whole object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HttpResponse {
    pub fn new(status_code: u16, body: Value) -> Self {
        Self {
            status_code: Some(status_code),
            body: Some(body),
            ..Self::default()
        }
    }

    /// Wraps a bare payload returned by a host that does not resolve with
    /// full responses.
    pub fn from_payload(payload: Value) -> Self {
        match payload {
            Value::Object(map) => serde_json::from_value(Value::Object(map.clone()))
                .unwrap_or_else(|_| Self {
                    extra: map,
                    ..Self::default()
                }),
            other => Self {
                body: Some(other),
                ..Self::default()
            },
        }
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }

    /// The response body, or the whole raw response when there is no body.
    pub fn payload(&self) -> Value {
        match &self.body {
            Some(body) => body.clone(),
            None => serde_json::to_value(self).unwrap_or(Value::Null),
        }
    }
}

/// Response attached to a failed call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureResponse {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Structured failure of an outbound call.
///
/// Hosts report failures in many shapes; every field is optional so a
/// failure can be as thin as a bare message (or nothing at all, which reads
/// as [`UNKNOWN_ERROR`]).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestFailure {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub response: Option<FailureResponse>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl RequestFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// A failure with nothing usable attached (e.g. a thrown string).
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn with_status_code(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_string(), value.into());
        self
    }

    pub fn with_response(mut self, status: Option<u16>, body: Value) -> Self {
        self.response = Some(FailureResponse {
            status,
            body: Some(body),
            headers: BTreeMap::new(),
        });
        self
    }

    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or(UNKNOWN_ERROR)
    }

    /// Every status code the failure carries, nested `response.status` first.
    pub fn statuses(&self) -> impl Iterator<Item = u16> + '_ {
        self.response
            .as_ref()
            .and_then(|r| r.status)
            .into_iter()
            .chain(self.status)
            .chain(self.status_code)
    }

    /// The first status code the failure carries.
    pub fn status(&self) -> Option<u16> {
        self.statuses().next()
    }

    /// Case-insensitive header lookup, top-level headers first.
    pub fn header(&self, name: &str) -> Option<&str> {
        let nested = self.response.iter().flat_map(|r| r.headers.iter());
        self.headers
            .iter()
            .chain(nested)
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body of the attached response, if any.
    pub fn response_body(&self) -> Option<&Value> {
        self.response.as_ref().and_then(|r| r.body.as_ref())
    }
}

impl fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for RequestFailure {}
