//! HTTP request handlers.

use axum::{
    body::Body,
    extract::{Extension, State},
    http::{header, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::server::{AppState, RequestId};
use super::stream::{pass_through, reframe, single_reply};
use super::types::{ChatForm, ChatResponse, ImageResponse};
use crate::config::StreamMode;
use crate::error::{Error, Result};
use crate::provider::{ChatProvider, OutputKind, ProviderReply};
use crate::router::{Route, RouteKind};
use crate::{extract, prompt};

/// Response header: provider that handled the request.
pub const PROVIDER_HEADER: &str = "x-promptgate-provider";
/// Response header: upstream model that handled the request.
pub const MODEL_HEADER: &str = "x-promptgate-model";
/// Response header: present with value "true" when the selector was not recognized.
pub const FALLBACK_HEADER: &str = "x-promptgate-fallback";
/// Response header: wall-clock latency in milliseconds (non-streaming only).
pub const LATENCY_MS_HEADER: &str = "x-promptgate-latency-ms";

/// Attach routing metadata headers to a response.
///
/// Latency is omitted on streaming responses (not known at header-send time).
fn attach_route_headers(response: &mut Response, route: &Route, latency_ms: Option<u128>) {
    let headers = response.headers_mut();

    if let Ok(value) = HeaderValue::from_str(&route.provider) {
        headers.insert(HeaderName::from_static(PROVIDER_HEADER), value);
    }
    if let Ok(value) = HeaderValue::from_str(&route.model) {
        headers.insert(HeaderName::from_static(MODEL_HEADER), value);
    }
    if route.kind == RouteKind::Fallback {
        headers.insert(
            HeaderName::from_static(FALLBACK_HEADER),
            HeaderValue::from_static("true"),
        );
    }
    if let Some(ms) = latency_ms {
        headers.insert(
            HeaderName::from_static(LATENCY_MS_HEADER),
            HeaderValue::from(ms as u64),
        );
    }
}

/// Validate the request, pick the adapter and build the prompt it should receive.
///
/// Image adapters get the user's prompt untouched; everything else gets the
/// prompt merged with the uploaded file's text.
async fn prepare(
    state: &AppState,
    form: ChatForm,
) -> Result<(Route, Arc<dyn ChatProvider>, String)> {
    let user_prompt = form.require_prompt()?;
    let (route, adapter) = state.registry.select(form.model.as_deref())?;

    tracing::info!(
        provider = %route.provider,
        model = %route.model,
        route = ?route.kind,
        has_file = form.file.is_some(),
        "Selected provider"
    );

    let final_prompt = match adapter.output() {
        OutputKind::Image => user_prompt.to_string(),
        OutputKind::Text => {
            let extracted =
                extract::extract(form.file.as_ref(), state.config.server.max_upload_bytes).await;
            prompt::compose(user_prompt, &extracted)
        }
    };

    Ok((route, adapter, final_prompt))
}

/// Handle POST /api/chat
pub async fn chat(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    form: ChatForm,
) -> Response {
    let start = std::time::Instant::now();

    let result = async {
        let (route, adapter, final_prompt) = prepare(&state, form).await?;
        let reply = adapter.invoke(&final_prompt, &route.model, false).await?;
        let response = match reply {
            ProviderReply::Text { text, model } => Json(ChatResponse {
                response: text,
                model,
            })
            .into_response(),
            ProviderReply::Image { url, model } => Json(ImageResponse {
                image_url: url,
                model,
            })
            .into_response(),
            ProviderReply::Stream(_) => {
                return Err(Error::Internal(
                    "provider returned a stream for a non-streaming request".to_string(),
                ))
            }
        };
        Ok::<_, Error>((route, response))
    }
    .await;

    let latency_ms = start.elapsed().as_millis();
    match result {
        Ok((route, mut response)) => {
            tracing::info!(
                request_id = %request_id.0,
                provider = %route.provider,
                latency_ms = latency_ms as u64,
                "Chat request completed"
            );
            attach_route_headers(&mut response, &route, Some(latency_ms));
            response
        }
        Err(e) => {
            tracing::error!(request_id = %request_id.0, error = %e, "Chat request failed");
            e.into_response()
        }
    }
}

/// Handle POST /api/chat-stream
///
/// Failures before the upstream stream is open are returned as JSON errors.
/// Once streaming has begun, failures become an inline `[ERROR]` event.
pub async fn chat_stream(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    form: ChatForm,
) -> Response {
    let result = async {
        let (route, adapter, final_prompt) = prepare(&state, form).await?;
        let reply = adapter.invoke(&final_prompt, &route.model, true).await?;
        Ok::<_, Error>((route, reply))
    }
    .await;

    let (route, reply) = match result {
        Ok(ok) => ok,
        Err(e) => {
            tracing::error!(request_id = %request_id.0, error = %e, "Stream setup failed");
            return e.into_response();
        }
    };

    // Cancelled when the client drops the response body.
    let cancel = CancellationToken::new();
    let body = match reply {
        ProviderReply::Stream(upstream) => match state.config.server.stream_mode {
            StreamMode::Reframe => {
                Body::from_stream(reframe(upstream.body, upstream.extractor, cancel))
            }
            StreamMode::Passthrough => Body::from_stream(pass_through(upstream.body, cancel)),
        },
        ProviderReply::Text { text, .. } => Body::from_stream(single_reply(text)),
        ProviderReply::Image { url, .. } => Body::from_stream(single_reply(url)),
    };

    tracing::info!(
        request_id = %request_id.0,
        provider = %route.provider,
        mode = ?state.config.server.stream_mode,
        "Streaming response started"
    );

    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    attach_route_headers(&mut response, &route, None);
    response
}

/// Handle GET /api/health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Handle GET /api/providers - list configured providers (never their keys)
pub async fn list_providers(State(state): State<AppState>) -> impl IntoResponse {
    let providers: Vec<serde_json::Value> = state
        .config
        .providers
        .iter()
        .map(|p| {
            serde_json::json!({
                "name": p.name,
                "kind": p.kind,
                "default_model": p.default_model,
                "models": p.models,
            })
        })
        .collect();

    Json(serde_json::json!({
        "default": {
            "provider": state.config.routing.default_provider,
            "model": state.config.routing.default_model,
        },
        "providers": providers,
    }))
}
