//! HTTP server setup and configuration.

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::handlers;
use crate::config::Config;
use crate::router::ProviderRegistry;

/// Response header: correlation ID (UUID v4).
pub const REQUEST_ID_HEADER: &str = "x-promptgate-request-id";

/// Headroom for multipart framing and text fields on top of the file cap.
const BODY_LIMIT_SLACK: usize = 1024 * 1024;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ProviderRegistry>,
    pub config: Arc<Config>,
}

/// Per-request correlation id, available to handlers as an extension.
#[derive(Debug, Clone, Copy)]
pub struct RequestId(pub Uuid);

/// Create the axum router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    let body_limit = state
        .config
        .server
        .max_upload_bytes
        .saturating_add(BODY_LIMIT_SLACK);
    let cors = create_cors_layer(&state.config);

    Router::new()
        .route("/api/chat", post(handlers::chat))
        .route("/api/chat-stream", post(handlers::chat_stream))
        .route("/api/health", get(handlers::health))
        .route("/api/providers", get(handlers::list_providers))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    reject_foreign_origin,
                ))
                .layer(middleware::from_fn(request_id)),
        )
        .with_state(state)
}

/// CORS headers for the configured allow-list.
fn create_cors_layer(config: &Config) -> CorsLayer {
    let allowed = config.server.allowed_origins.clone();
    let allow_origin = if allowed.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = allowed
            .iter()
            .filter_map(|o| o.trim_end_matches('/').parse::<HeaderValue>().ok())
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)])
}

/// Reject cross-origin requests whose `Origin` is not on the allow-list.
async fn reject_foreign_origin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if let Some(origin) = origin {
        if !state.config.server.origin_allowed(&origin) {
            tracing::warn!(origin = %origin, "Rejected request from disallowed origin");
            let body = serde_json::json!({ "error": "Origin not allowed" });
            return (axum::http::StatusCode::FORBIDDEN, axum::Json(body)).into_response();
        }
    }

    next.run(request).await
}

/// Attach a fresh request id to the request extensions and the response headers.
async fn request_id(mut request: Request, next: Next) -> Response {
    let id = RequestId(Uuid::new_v4());
    request.extensions_mut().insert(id);

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id.0.to_string()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

/// Run the HTTP server.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let listen_addr = config.server.listen.clone();

    let registry = ProviderRegistry::from_config(&config)?;

    let state = AppState {
        registry: Arc::new(registry),
        config: Arc::new(config),
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(address = %listen_addr, "Starting promptgate server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
