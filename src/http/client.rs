//! reqwest-backed [`HttpCapability`].

use super::{
    FailureResponse, HttpCapability, HttpMethod, HttpResponse, RequestBody, RequestFailure,
    RequestOptions,
};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Transport adapter over a shared [`reqwest::Client`].
///
/// Non-2xx responses become a [`RequestFailure`] carrying the status, the
/// response headers (so `retry-after` is visible to the backoff) and the
/// decoded body (so OAuth2 error objects are visible to the refresh).
#[derive(Clone, Default)]
pub struct ReqwestCapability {
    client: reqwest::Client,
}

impl ReqwestCapability {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpCapability for ReqwestCapability {
    async fn request(&self, options: RequestOptions) -> Result<HttpResponse, RequestFailure> {
        let RequestOptions {
            method,
            url,
            query,
            mut headers,
            body,
            json,
        } = options;

        if matches!(body, RequestBody::Form(_))
            && !headers.keys().any(|k| k.eq_ignore_ascii_case("content-type"))
        {
            headers.insert(
                "Content-Type".to_string(),
                "application/x-www-form-urlencoded".to_string(),
            );
        }

        let mut builder = self.client.request(to_reqwest_method(method), &url);
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Raw(text) => builder.body(text),
            RequestBody::Form(fields) => {
                let encoded = serde_urlencoded::to_string(&fields).map_err(|e| {
                    RequestFailure::new(format!("Failed to encode form body: {}", e))
                        .with_name("RequestError")
                })?;
                builder.body(encoded)
            }
            RequestBody::Multipart(fields) => {
                let form = fields
                    .into_iter()
                    .fold(reqwest::multipart::Form::new(), |form, (name, value)| {
                        form.text(name, value)
                    });
                builder.multipart(form)
            }
        };

        debug!(method = %method, url = %url, "Sending request");

        let response = builder.send().await.map_err(transport_failure)?;
        let status = response.status();
        let response_headers = collect_headers(response.headers());
        let decode_json = json || is_json_content(&response_headers);
        let text = response.text().await.map_err(transport_failure)?;
        let body = decode_body(&text, decode_json);

        if status.is_success() {
            return Ok(HttpResponse {
                status_code: Some(status.as_u16()),
                headers: Some(response_headers),
                body,
                ..HttpResponse::default()
            });
        }

        debug!(status = status.as_u16(), url = %url, "Request failed");

        Err(RequestFailure {
            message: Some(format!(
                "Request failed with status code {}",
                status.as_u16()
            )),
            name: Some("HttpError".to_string()),
            status_code: Some(status.as_u16()),
            headers: response_headers.clone(),
            response: Some(FailureResponse {
                status: Some(status.as_u16()),
                body,
                headers: response_headers,
            }),
            ..RequestFailure::default()
        })
    }
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Patch => reqwest::Method::PATCH,
    }
}

fn transport_failure(err: reqwest::Error) -> RequestFailure {
    let failure = RequestFailure::new(err.to_string()).with_name("RequestError");
    if err.is_timeout() {
        failure.with_code("ETIMEDOUT")
    } else {
        failure
    }
}

fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

fn is_json_content(headers: &BTreeMap<String, String>) -> bool {
    headers
        .get("content-type")
        .map(|ct| ct.contains("json"))
        .unwrap_or(false)
}

/// Empty bodies decode to `None`; undecodable JSON falls back to text.
fn decode_body(text: &str, json: bool) -> Option<Value> {
    if text.is_empty() {
        return None;
    }
    if json {
        if let Ok(value) = serde_json::from_str(text) {
            return Some(value);
        }
    }
    Some(Value::String(text.to_string()))
}
