//! Integration tests for POST /api/chat-stream.
//!
//! Verifies that:
//! - OpenAI-style deltas are re-framed as `{"content": ...}` events ending in one `[DONE]`
//! - Gemini SSE is re-framed the same way, and `[DONE]` is added when upstream omits it
//! - An in-band upstream error becomes an `[ERROR]` event followed by `[DONE]`
//! - Failures before streaming begins are plain JSON errors
//! - Pass-through mode forwards upstream bytes unchanged

use std::sync::Arc;

use axum::body::Body;
use http::{Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use promptgate::config::Config;
use promptgate::proxy::{create_router, AppState};
use promptgate::router::ProviderRegistry;

const CONFIG: &str = r#"
[routing]
default_provider = "openai"
default_model = "gpt-4o-mini"

[[providers]]
name = "openai"
kind = "openai"
url = "{upstream}/oa"
api_key = "sk-oa-test"
default_model = "gpt-4o-mini"

[[providers]]
name = "gemini"
kind = "gemini"
url = "{upstream}/gm"
api_key = "gm-test"
default_model = "gemini-1.5-flash"

[[providers]]
name = "dalle"
kind = "openai_image"
url = "{upstream}/img"
api_key = "sk-img-test"
default_model = "dall-e-3"
"#;

fn setup_app(toml: &str, upstream: &str) -> axum::Router {
    let content = toml.replace("{upstream}", upstream);
    let (config, _) = Config::parse_str_with(&content, |_| None).expect("valid config");
    let registry = ProviderRegistry::from_config(&config).expect("registry");
    create_router(AppState {
        registry: Arc::new(registry),
        config: Arc::new(config),
    })
}

fn stream_request(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/chat-stream")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn sse(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream")
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
        .await
        .expect("read body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

#[tokio::test]
async fn test_openai_deltas_are_reframed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oa/chat/completions"))
        .and(body_partial_json(json!({"stream": true, "model": "gpt-4o-mini"})))
        .respond_with(sse(concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"A\"}}]}\n\n",
            ": keep-alive\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"B\"}}]}\n\n",
            "data: [DONE]\n\n",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let app = setup_app(CONFIG, &server.uri());
    let response = app
        .oneshot(stream_request(json!({"prompt": "Hello", "model": "openai"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");
    assert_eq!(response.headers()["cache-control"], "no-cache");
    assert_eq!(response.headers()["x-promptgate-provider"], "openai");

    let body = body_text(response).await;
    assert_eq!(
        body,
        "data: {\"content\":\"A\"}\n\ndata: {\"content\":\"B\"}\n\ndata: [DONE]\n\n"
    );
}

#[tokio::test]
async fn test_gemini_stream_without_done_still_terminates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/gm/models/gemini-1.5-flash:streamGenerateContent"))
        .and(query_param("alt", "sse"))
        .and(query_param("key", "gm-test"))
        .respond_with(sse(concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hel\"}]}}]}\r\n\r\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"lo\"}]}}]}\r\n\r\n",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let app = setup_app(CONFIG, &server.uri());
    let response = app
        .oneshot(stream_request(json!({"prompt": "Hi", "model": "gemini"})))
        .await
        .unwrap();

    let body = body_text(response).await;
    assert_eq!(
        body,
        "data: {\"content\":\"Hel\"}\n\ndata: {\"content\":\"lo\"}\n\ndata: [DONE]\n\n"
    );
}

#[tokio::test]
async fn test_in_band_error_is_reported_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oa/chat/completions"))
        .respond_with(sse(concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"A\"}}]}\n\n",
            "data: {\"error\":{\"message\":\"rate limited\"}}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
            "data: [DONE]\n\n",
        )))
        .mount(&server)
        .await;

    let app = setup_app(CONFIG, &server.uri());
    let response = app
        .oneshot(stream_request(json!({"prompt": "Hello"})))
        .await
        .unwrap();

    let body = body_text(response).await;
    assert_eq!(
        body,
        "data: {\"content\":\"A\"}\n\ndata: {\"content\":\"[ERROR] rate limited\"}\n\ndata: [DONE]\n\n"
    );
    assert_eq!(body.matches("[DONE]").count(), 1);
}

#[tokio::test]
async fn test_setup_failure_is_json_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oa/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "message": "invalid api key" }
        })))
        .mount(&server)
        .await;

    let app = setup_app(CONFIG, &server.uri());
    let response = app
        .oneshot(stream_request(json!({"prompt": "Hello"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert!(body["error"].as_str().unwrap().contains("invalid api key"));
}

#[tokio::test]
async fn test_missing_prompt_is_rejected_before_streaming() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(sse("data: [DONE]\n\n"))
        .expect(0)
        .mount(&server)
        .await;

    let app = setup_app(CONFIG, &server.uri());
    let response = app
        .oneshot(stream_request(json!({"model": "openai"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["error"], "Prompt is required");
}

#[tokio::test]
async fn test_image_model_cannot_stream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(sse("data: [DONE]\n\n"))
        .expect(0)
        .mount(&server)
        .await;

    let app = setup_app(CONFIG, &server.uri());
    let response = app
        .oneshot(stream_request(json!({"prompt": "a fox", "model": "dalle"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_passthrough_mode_forwards_bytes() {
    let upstream_body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"A\"}}]}\n\n",
        "data: [DONE]\n\n",
    );

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oa/chat/completions"))
        .respond_with(sse(upstream_body))
        .mount(&server)
        .await;

    let config = CONFIG.replacen(
        "[routing]",
        "[server]\nstream_mode = \"passthrough\"\n\n[routing]",
        1,
    );
    let app = setup_app(&config, &server.uri());
    let response = app
        .oneshot(stream_request(json!({"prompt": "Hello"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, upstream_body);
}
