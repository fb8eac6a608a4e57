// Integration tests for the host API: credential CRUD and node execution
// against a mock upstream and token endpoint.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::{json, Value};
use smarthttp::config::SmartHttpConfig;
use smarthttp::http::ReqwestCapability;
use smarthttp::retry::{RandomJitter, Sleeper, SystemClock, Timing};
use smarthttp::CredentialStore;
use smarthttp_host::api::{create_router, ApiState};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct NoSleep;

#[async_trait]
impl Sleeper for NoSleep {
    async fn sleep(&self, _delay: Duration) {}
}

fn create_test_app(store: Arc<CredentialStore>) -> Router {
    let state = ApiState {
        credential_store: store,
        http: Arc::new(ReqwestCapability::new()),
        config: Arc::new(SmartHttpConfig::default()),
        timing: Timing {
            clock: Arc::new(SystemClock),
            jitter: Arc::new(RandomJitter),
            sleeper: Arc::new(NoSleep),
        },
    };
    create_router(state)
}

fn memory_store() -> Arc<CredentialStore> {
    Arc::new(CredentialStore::new(":memory:", &STANDARD.encode([7u8; 32])).unwrap())
}

fn credential_json(auth_url: &str, access_token: &str) -> Value {
    json!({
        "clientId": "client-123",
        "clientSecret": "secret-456",
        "authUrl": auth_url,
        "accessToken": access_token,
        "refreshToken": "refresh-789",
        "tokenType": "Bearer"
    })
}

fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// PUT, GET and DELETE on /api/credentials.
#[tokio::test]
async fn test_credential_lifecycle() {
    let app = create_test_app(memory_store());

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/api/credentials/oAuth2ApiEnhanced",
            &credential_json("https://auth.example.com", "tok"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/api/credentials"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listed = body_json(response).await;
    assert_eq!(listed, json!({"credentials": ["oAuth2ApiEnhanced"]}));

    let response = app
        .clone()
        .oneshot(empty_request("DELETE", "/api/credentials/oAuth2ApiEnhanced"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(empty_request("DELETE", "/api/credentials/oAuth2ApiEnhanced"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

/// Malformed credential bodies are rejected before touching the store.
#[tokio::test]
async fn test_put_credential_rejects_bad_body() {
    let store = memory_store();
    let app = create_test_app(store.clone());

    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/api/credentials/crm")
                .header("Content-Type", "application/json")
                .body(Body::from("not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_client_error());
    assert!(store.list_names().unwrap().is_empty());
}

/// A plain GET goes out with the stored bearer token.
#[tokio::test]
async fn test_execute_success() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/data")
        .match_header("authorization", "Bearer tok-1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"data":"success"}"#)
        .create_async()
        .await;

    let store = memory_store();
    store
        .store(
            "oAuth2ApiEnhanced",
            &serde_json::from_value(credential_json(&server.url(), "tok-1")).unwrap(),
        )
        .unwrap();
    let app = create_test_app(store);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/execute",
            &json!({
                "parameters": {"method": "GET", "url": format!("{}/data", server.url())},
                "items": [{"json": {"test": "data"}}]
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let result = &body["results"][0];
    assert_eq!(result["statusCode"], 200);
    assert_eq!(result["body"], json!({"data": "success"}));
    assert_eq!(result["retryAttempt"], 0);
    mock.assert_async().await;
}

/// 401 triggers a refresh against `{authUrl}/token` and one retry.
#[tokio::test]
async fn test_execute_refreshes_after_unauthorized() {
    let mut server = mockito::Server::new_async().await;
    let stale = server
        .mock("GET", "/data")
        .match_header("authorization", "Bearer stale-token")
        .with_status(401)
        .with_body(r#"{"error":"invalid_token"}"#)
        .expect(1)
        .create_async()
        .await;
    let token = server
        .mock("POST", "/oauth/token")
        .match_body(mockito::Matcher::UrlEncoded(
            "grant_type".into(),
            "refresh_token".into(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"fresh-token","expires_in":3600}"#)
        .expect(1)
        .create_async()
        .await;
    let fresh = server
        .mock("GET", "/data")
        .match_header("authorization", "Bearer fresh-token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"ok":true}"#)
        .expect(1)
        .create_async()
        .await;

    let store = memory_store();
    store
        .store(
            "oAuth2ApiEnhanced",
            &serde_json::from_value(credential_json(
                &format!("{}/oauth", server.url()),
                "stale-token",
            ))
            .unwrap(),
        )
        .unwrap();
    let app = create_test_app(store.clone());

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/execute",
            &json!({
                "parameters": {"url": format!("{}/data", server.url())},
                "items": [{}]
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["results"][0]["retryAttempt"], 1);
    assert_eq!(body["results"][0]["body"], json!({"ok": true}));
    stale.assert_async().await;
    token.assert_async().await;
    fresh.assert_async().await;

    // refreshed tokens are not written back
    let stored = store.get("oAuth2ApiEnhanced").unwrap().unwrap();
    assert_eq!(stored.access_token, "stale-token");
}

/// Stop policy: the first failing item aborts with 422 and its index.
#[tokio::test]
async fn test_execute_stop_policy() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/broken")
        .with_status(500)
        .create_async()
        .await;

    let store = memory_store();
    store
        .store(
            "oAuth2ApiEnhanced",
            &serde_json::from_value(credential_json(&server.url(), "tok")).unwrap(),
        )
        .unwrap();
    let app = create_test_app(store);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/execute",
            &json!({
                "parameters": {"url": format!("{}/broken", server.url())},
                "items": [{}, {}]
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["item"], 0);
    assert_eq!(body["error"], "Request failed with status code 500");
}

/// Continue policy: failures become error-shaped results, later items run.
#[tokio::test]
async fn test_execute_continue_policy() {
    let mut server = mockito::Server::new_async().await;
    let _broken = server
        .mock("GET", "/broken")
        .with_status(500)
        .create_async()
        .await;
    let _ok = server
        .mock("POST", "/ok")
        .match_body(mockito::Matcher::Json(json!({"id": 2})))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"created":true}"#)
        .create_async()
        .await;

    let store = memory_store();
    store
        .store(
            "oAuth2ApiEnhanced",
            &serde_json::from_value(credential_json(&server.url(), "tok")).unwrap(),
        )
        .unwrap();
    let app = create_test_app(store);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/execute",
            &json!({
                "continue_on_fail": true,
                "parameters": {"url": format!("{}/broken", server.url())},
                "items": [
                    {},
                    {"parameters": {
                        "method": "POST",
                        "url": format!("{}/ok", server.url()),
                        "bodyJson": {"id": 2}
                    }}
                ]
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(
        body["results"][0],
        json!({"error": "Request failed with status code 500", "item": 0, "attempts": 1})
    );
    assert_eq!(body["results"][1]["statusCode"], 201);
    assert_eq!(body["results"][1]["body"], json!({"created": true}));
}

/// Missing credential surfaces as a per-item error.
#[tokio::test]
async fn test_execute_without_credential() {
    let app = create_test_app(memory_store());

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/execute",
            &json!({
                "parameters": {"url": "https://api.example.com"},
                "items": [{}]
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["item"], 0);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Credentials unavailable"));
}
