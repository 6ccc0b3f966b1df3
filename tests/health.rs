//! Integration tests for the informational endpoints.
//!
//! Verifies that:
//! - GET /api/health reports "ok" with an RFC 3339 timestamp and never calls upstream
//! - GET /api/providers lists names, kinds and models but never API keys
//! - Every response carries a request id

use std::sync::Arc;

use axum::body::Body;
use http::{Request, StatusCode};
use tower::ServiceExt;

use promptgate::config::Config;
use promptgate::proxy::{create_router, AppState};
use promptgate::router::ProviderRegistry;

const CONFIG: &str = r#"
[routing]
default_provider = "openrouter"
default_model = "deepseek/deepseek-chat"

[[providers]]
name = "openrouter"
kind = "openrouter"
url = "http://127.0.0.1:9/v1"
api_key = "sk-secret-openrouter"

[[providers]]
name = "openai"
kind = "openai"
url = "http://127.0.0.1:9/v1"
default_model = "gpt-4o-mini"
models = ["gpt-4o", "gpt-4o-mini"]
"#;

fn setup_app() -> axum::Router {
    let (config, _) = Config::parse_str_with(CONFIG, |name| {
        (name == "OPENAI_API_KEY").then(|| "sk-secret-openai".to_string())
    })
    .expect("valid config");
    let registry = ProviderRegistry::from_config(&config).expect("registry");
    create_router(AppState {
        registry: Arc::new(registry),
        config: Arc::new(config),
    })
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, http::HeaderMap, String) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
        .await
        .expect("read body");
    (status, headers, String::from_utf8_lossy(&bytes).into_owned())
}

#[tokio::test]
async fn test_health_ok() {
    let (status, headers, body) = get(setup_app(), "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.contains_key("x-promptgate-request-id"));

    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "ok");
    let timestamp = json["timestamp"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
}

#[tokio::test]
async fn test_request_ids_are_unique() {
    let app = setup_app();
    let (_, first, _) = get(app.clone(), "/api/health").await;
    let (_, second, _) = get(app, "/api/health").await;
    assert_ne!(
        first["x-promptgate-request-id"],
        second["x-promptgate-request-id"]
    );
}

#[tokio::test]
async fn test_providers_listing_hides_keys() {
    let (status, _, body) = get(setup_app(), "/api/providers").await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body.contains("sk-secret"));

    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["default"]["provider"], "openrouter");
    assert_eq!(json["default"]["model"], "deepseek/deepseek-chat");

    let providers = json["providers"].as_array().unwrap();
    assert_eq!(providers.len(), 2);
    assert_eq!(providers[1]["name"], "openai");
    assert_eq!(providers[1]["kind"], "openai");
    assert_eq!(providers[1]["models"], serde_json::json!(["gpt-4o", "gpt-4o-mini"]));
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let (status, _, _) = get(setup_app(), "/api/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
