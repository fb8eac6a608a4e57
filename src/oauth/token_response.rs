//! Normalization of authorization-server responses.
//!
//! Providers disagree on field naming. Everything is mapped onto one
//! canonical [`TokenResponse`] here so the refresh logic never sees the
//! variation.

use serde::Deserialize;
use serde_json::Value;

/// Canonical token response.
#[derive(Clone, Debug, PartialEq)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub token_type: Option<String>,
}

/// Seconds until expiry, sent as a number by most providers and as a string
/// by a few.
#[derive(Deserialize)]
#[serde(untagged)]
enum Seconds {
    Number(i64),
    Float(f64),
    Text(String),
}

impl Seconds {
    fn into_secs(self) -> Option<i64> {
        match self {
            Seconds::Number(n) => Some(n),
            Seconds::Float(f) if f.is_finite() => Some(f as i64),
            Seconds::Float(_) => None,
            Seconds::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Wire shape accepting both snake_case and camelCase names.
#[derive(Deserialize)]
struct ProviderTokenResponse {
    access_token: Option<String>,
    #[serde(rename = "accessToken")]
    access_token_camel: Option<String>,
    refresh_token: Option<String>,
    #[serde(rename = "refreshToken")]
    refresh_token_camel: Option<String>,
    expires_in: Option<Seconds>,
    #[serde(rename = "expiresIn")]
    expires_in_camel: Option<Seconds>,
    token_type: Option<String>,
    #[serde(rename = "tokenType")]
    token_type_camel: Option<String>,
}

impl TokenResponse {
    /// Normalizes a provider payload. snake_case wins when both spellings
    /// are present.
    ///
    /// # Errors
    /// Returns a description when the payload is not an object or carries no
    /// access token under either name.
    pub fn from_provider(payload: &Value) -> Result<Self, String> {
        let raw = ProviderTokenResponse::deserialize(payload)
            .map_err(|e| format!("Unrecognized token response: {}", e))?;

        let access_token = raw
            .access_token
            .or(raw.access_token_camel)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| "Token response did not include an access token".to_string())?;

        Ok(Self {
            access_token,
            refresh_token: raw
                .refresh_token
                .or(raw.refresh_token_camel)
                .filter(|t| !t.is_empty()),
            expires_in: raw
                .expires_in
                .and_then(Seconds::into_secs)
                .or_else(|| raw.expires_in_camel.and_then(Seconds::into_secs)),
            token_type: raw
                .token_type
                .or(raw.token_type_camel)
                .filter(|t| !t.is_empty()),
        })
    }
}

/// Structured OAuth2 error object (RFC 6749 §5.2).
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct OAuthErrorBody {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl OAuthErrorBody {
    /// Parses an error body, which may be an object or a JSON-encoded string.
    pub fn from_body(body: &Value) -> Option<Self> {
        match body {
            Value::Object(_) => Self::deserialize(body).ok(),
            Value::String(text) => serde_json::from_str(text).ok(),
            _ => None,
        }
    }

    /// `error` followed by the description, when there is one.
    pub fn summary(&self) -> String {
        match &self.error_description {
            Some(description) if !description.is_empty() => {
                format!("{} - {}", self.error, description)
            }
            _ => self.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snake_case_response() {
        let response = TokenResponse::from_provider(&json!({
            "access_token": "ya29.a0AfH6SMC7",
            "expires_in": 3599,
            "refresh_token": "1//04xx",
            "scope": "https://www.googleapis.com/auth/userinfo.email",
            "token_type": "Bearer"
        }))
        .unwrap();

        assert_eq!(response.access_token, "ya29.a0AfH6SMC7");
        assert_eq!(response.refresh_token.as_deref(), Some("1//04xx"));
        assert_eq!(response.expires_in, Some(3599));
        assert_eq!(response.token_type.as_deref(), Some("Bearer"));
    }

    #[test]
    fn test_camel_case_matches_snake_case() {
        let camel = TokenResponse::from_provider(&json!({
            "accessToken": "new-access-token",
            "refreshToken": "new-refresh-token",
            "expiresIn": 7200,
            "tokenType": "bearer"
        }))
        .unwrap();
        let snake = TokenResponse::from_provider(&json!({
            "access_token": "new-access-token",
            "refresh_token": "new-refresh-token",
            "expires_in": 7200,
            "token_type": "bearer"
        }))
        .unwrap();

        assert_eq!(camel, snake);
    }

    #[test]
    fn test_snake_case_preferred() {
        let response = TokenResponse::from_provider(&json!({
            "access_token": "snake",
            "accessToken": "camel",
            "expires_in": 60,
            "expiresIn": 120
        }))
        .unwrap();

        assert_eq!(response.access_token, "snake");
        assert_eq!(response.expires_in, Some(60));
    }

    #[test]
    fn test_expires_in_as_string() {
        let response =
            TokenResponse::from_provider(&json!({"access_token": "t", "expires_in": "3600"}))
                .unwrap();
        assert_eq!(response.expires_in, Some(3600));
    }

    #[test]
    fn test_missing_access_token() {
        let err = TokenResponse::from_provider(&json!({"token_type": "Bearer"})).unwrap_err();
        assert!(err.contains("access token"));
        assert!(TokenResponse::from_provider(&json!("just text")).is_err());
    }

    #[test]
    fn test_error_body_summary() {
        let body = OAuthErrorBody::from_body(&json!({
            "error": "invalid_grant",
            "error_description": "Token has been expired or revoked."
        }))
        .unwrap();
        assert_eq!(body.summary(), "invalid_grant - Token has been expired or revoked.");
    }

    #[test]
    fn test_error_body_with_extra_fields_and_string_form() {
        let microsoft = OAuthErrorBody::from_body(&json!({
            "error": "invalid_client",
            "error_description": "AADSTS70002: Error validating credentials.",
            "error_codes": [70002, 50012],
            "trace_id": "abcd-efgh-1234-5678"
        }))
        .unwrap();
        assert_eq!(microsoft.error, "invalid_client");

        let encoded = OAuthErrorBody::from_body(&json!(r#"{"error":"invalid_grant"}"#)).unwrap();
        assert_eq!(encoded.summary(), "invalid_grant");

        assert!(OAuthErrorBody::from_body(&json!({"message": "nope"})).is_none());
    }
}
