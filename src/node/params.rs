//! Per-record request parameters.
//!
//! The host exposes parameters as loosely typed JSON values keyed by name and
//! record index. Everything is read and validated here, once per record,
//! before any network activity happens.

use crate::error::SmartHttpError;
use crate::http::{HttpMethod, RequestBody, RequestOptions};
use crate::retry::RetryPolicy;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const JSON_CONTENT_TYPE: &str = "application/json";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const DEFAULT_RAW_CONTENT_TYPE: &str = "text/plain";

/// Per-record parameter lookup supplied by the host.
pub trait ParameterStore: Send + Sync {
    /// Value of `name` for the record at `item_index`, if set.
    fn parameter(&self, name: &str, item_index: usize) -> Option<Value>;
}

/// Parameters fixed up front: node-level values plus optional per-record
/// overrides.
#[derive(Clone, Debug, Default)]
pub struct StaticParameters {
    defaults: Map<String, Value>,
    overrides: Vec<Map<String, Value>>,
}

impl StaticParameters {
    pub fn new(defaults: Map<String, Value>) -> Self {
        Self {
            defaults,
            overrides: Vec::new(),
        }
    }

    /// Builds from a JSON object; anything else yields no defaults.
    pub fn from_value(defaults: Value) -> Self {
        match defaults {
            Value::Object(map) => Self::new(map),
            _ => Self::default(),
        }
    }

    /// Overrides for the record at `item_index`.
    pub fn with_item(mut self, item_index: usize, overrides: Map<String, Value>) -> Self {
        if self.overrides.len() <= item_index {
            self.overrides.resize_with(item_index + 1, Map::new);
        }
        self.overrides[item_index].extend(overrides);
        self
    }
}

impl ParameterStore for StaticParameters {
    fn parameter(&self, name: &str, item_index: usize) -> Option<Value> {
        self.overrides
            .get(item_index)
            .and_then(|item| item.get(name))
            .or_else(|| self.defaults.get(name))
            .filter(|value| !value.is_null())
            .cloned()
    }
}

/// How the request body is built.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BodyMode {
    None,
    #[default]
    Json,
    Raw,
    FormUrlEncoded,
    Multipart,
}

impl BodyMode {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "none" => Some(BodyMode::None),
            "json" => Some(BodyMode::Json),
            "raw" => Some(BodyMode::Raw),
            "formUrlEncoded" => Some(BodyMode::FormUrlEncoded),
            "multipart" => Some(BodyMode::Multipart),
            _ => None,
        }
    }
}

/// Validated parameters of one record.
#[derive(Clone, Debug, PartialEq)]
pub struct ItemParameters {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body_mode: BodyMode,
    pub body_json: Option<Value>,
    pub raw_content_type: String,
    pub raw_body: String,
    pub form_fields: BTreeMap<String, String>,
    pub multipart_fields: BTreeMap<String, String>,
    pub auto_retry: Option<bool>,
    pub max_retries: Option<u32>,
}

impl ItemParameters {
    /// Reads and validates every parameter of the record at `item_index`.
    ///
    /// # Errors
    /// [`SmartHttpError::InvalidParameter`] naming the first bad parameter.
    pub fn read(store: &dyn ParameterStore, item_index: usize) -> Result<Self, SmartHttpError> {
        let get = |name: &str| store.parameter(name, item_index);

        let method = match get("method") {
            None => HttpMethod::default(),
            Some(value) => {
                let name = text("method", &value)?;
                HttpMethod::parse(&name).ok_or_else(|| {
                    SmartHttpError::invalid_parameter(
                        "method",
                        format!("unsupported method '{}'", name),
                    )
                })?
            }
        };

        let url = get("url")
            .map(|value| text("url", &value))
            .transpose()?
            .map(|url| url.trim().to_string())
            .unwrap_or_default();
        if url.is_empty() {
            return Err(SmartHttpError::invalid_parameter("url", "must not be empty"));
        }

        let body_mode = match get("bodyMode") {
            None => BodyMode::default(),
            Some(value) => {
                let name = text("bodyMode", &value)?;
                BodyMode::parse(&name).ok_or_else(|| {
                    SmartHttpError::invalid_parameter(
                        "bodyMode",
                        format!("unknown body mode '{}'", name),
                    )
                })?
            }
        };

        let body_json = match get("bodyJson") {
            None => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(Value::String(s)) => Some(serde_json::from_str(&s).map_err(|e| {
                SmartHttpError::invalid_parameter("bodyJson", format!("not valid JSON: {}", e))
            })?),
            Some(value) => Some(value),
        };

        let raw_content_type = get("rawContentType")
            .map(|value| text("rawContentType", &value))
            .transpose()?
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_RAW_CONTENT_TYPE.to_string());

        let raw_body = get("rawBody")
            .map(|value| text("rawBody", &value))
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            method,
            url,
            query: name_values("queryParametersUi", get("queryParametersUi"))?,
            headers: name_values("headersUi", get("headersUi"))?,
            body_mode,
            body_json,
            raw_content_type,
            raw_body,
            form_fields: name_values("formFieldsUi", get("formFieldsUi"))?
                .into_iter()
                .collect(),
            multipart_fields: name_values("multipartFieldsUi", get("multipartFieldsUi"))?
                .into_iter()
                .collect(),
            auto_retry: get("autoRetry").map(|v| flag("autoRetry", &v)).transpose()?,
            max_retries: get("maxRetries")
                .map(|v| count("maxRetries", &v))
                .transpose()?,
        })
    }

    /// Record-level retry switches, falling back to `defaults`.
    pub fn retry_policy(&self, defaults: RetryPolicy) -> RetryPolicy {
        RetryPolicy {
            auto_retry: self.auto_retry.unwrap_or(defaults.auto_retry),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
        }
    }

    /// Builds the outbound request, without authorization.
    ///
    /// Exactly one body mode applies. Only JSON mode keeps the JSON envelope.
    /// Custom headers are applied last and win over the defaults.
    pub fn to_request(&self) -> RequestOptions {
        let mut options = RequestOptions::new(self.method, self.url.clone())
            .with_header("Content-Type", JSON_CONTENT_TYPE);
        options.query = self.query.clone();

        match self.body_mode {
            BodyMode::Json => {
                if let Some(body) = &self.body_json {
                    options.body = RequestBody::Json(body.clone());
                }
            }
            BodyMode::None => {
                options.remove_header("Content-Type");
                options.json = false;
            }
            BodyMode::Raw => {
                options.set_header("Content-Type", self.raw_content_type.clone());
                options.body = RequestBody::Raw(self.raw_body.clone());
                options.json = false;
            }
            BodyMode::FormUrlEncoded => {
                options.set_header("Content-Type", FORM_CONTENT_TYPE);
                options.body = RequestBody::Form(self.form_fields.clone());
                options.json = false;
            }
            BodyMode::Multipart => {
                // the transport sets the boundary
                options.remove_header("Content-Type");
                options.body = RequestBody::Multipart(self.multipart_fields.clone());
                options.json = false;
            }
        }

        for (name, value) in &self.headers {
            options.set_header(name, value.clone());
        }
        options
    }
}

fn text(name: &str, value: &Value) -> Result<String, SmartHttpError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(SmartHttpError::invalid_parameter(name, "expected a string")),
    }
}

fn flag(name: &str, value: &Value) -> Result<bool, SmartHttpError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(false),
        _ => Err(SmartHttpError::invalid_parameter(name, "expected a boolean")),
    }
}

fn count(name: &str, value: &Value) -> Result<u32, SmartHttpError> {
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| SmartHttpError::invalid_parameter(name, "expected a non-negative integer"))
}

/// Reads a `{ parameters: [{ name, value }] }` collection (the singular
/// `parameter` key is accepted too). Entries without a name are skipped.
fn name_values(name: &str, value: Option<Value>) -> Result<Vec<(String, String)>, SmartHttpError> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    let Value::Object(mut collection) = value else {
        return Err(SmartHttpError::invalid_parameter(
            name,
            "expected a name/value collection",
        ));
    };
    let entries = match collection
        .remove("parameters")
        .or_else(|| collection.remove("parameter"))
    {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(entries)) => entries,
        Some(_) => {
            return Err(SmartHttpError::invalid_parameter(
                name,
                "expected a list of name/value pairs",
            ))
        }
    };

    let mut pairs = Vec::with_capacity(entries.len());
    for entry in entries {
        let key = entry
            .get("name")
            .map(|n| text(name, n))
            .transpose()?
            .unwrap_or_default();
        if key.is_empty() {
            continue;
        }
        let value = match entry.get("value") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };
        pairs.push((key, value));
    }
    Ok(pairs)
}
