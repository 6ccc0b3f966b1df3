//! Provider adapters.
//!
//! Each adapter translates a composed prompt into one upstream's wire format,
//! sends it, and normalizes the reply into a [`ProviderReply`].

mod gemini;
mod image;
mod openai;

pub use gemini::Gemini;
pub use image::OpenAiImage;
pub use openai::OpenAiCompatible;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

use crate::config::{ProviderConfig, ProviderKind};
use crate::error::{Error, Result};
use crate::proxy::stream::{upstream_error_message, ByteStream, DeltaExtractor};

/// What an adapter produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Text,
    /// Image adapters receive the user's prompt without any file content merged in.
    Image,
}

/// A live upstream event stream plus the parser for its payloads.
pub struct UpstreamStream {
    pub model: String,
    pub body: ByteStream,
    pub extractor: DeltaExtractor,
}

impl std::fmt::Debug for UpstreamStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamStream")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

/// Normalized provider reply.
#[derive(Debug)]
pub enum ProviderReply {
    Text { text: String, model: String },
    Image { url: String, model: String },
    Stream(UpstreamStream),
}

/// One upstream LLM API.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Configured provider name (the selector namespace).
    fn name(&self) -> &str;

    fn output(&self) -> OutputKind {
        OutputKind::Text
    }

    /// Send `prompt` to `model`, either awaiting the full reply or returning the live stream.
    async fn invoke(&self, prompt: &str, model: &str, streaming: bool) -> Result<ProviderReply>;
}

/// Settings shared by every adapter built from one config.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub client: reqwest::Client,
    /// Total timeout for non-streaming calls.
    pub request_timeout: Duration,
}

impl ClientSettings {
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self {
            client,
            request_timeout,
        })
    }
}

/// Build the adapter for one provider entry.
pub fn build(config: &ProviderConfig, settings: &ClientSettings) -> Result<Arc<dyn ChatProvider>> {
    let headers = extra_headers(config)?;
    let adapter: Arc<dyn ChatProvider> = match config.kind {
        ProviderKind::Openai
        | ProviderKind::Deepseek
        | ProviderKind::Together
        | ProviderKind::Openrouter
        | ProviderKind::Generic => Arc::new(OpenAiCompatible::new(config, headers, settings)),
        ProviderKind::Gemini => Arc::new(Gemini::new(config, headers, settings)?),
        ProviderKind::OpenaiImage => Arc::new(OpenAiImage::new(config, headers, settings)?),
    };
    Ok(adapter)
}

fn extra_headers(config: &ProviderConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            Error::Internal(format!("invalid header for '{}': {}", config.name, e))
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            Error::Internal(format!("invalid header for '{}': {}", config.name, e))
        })?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// Turn a non-2xx upstream response into an [`Error::Upstream`].
async fn ensure_success(provider: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::error!(
        provider = %provider,
        status = %status,
        body = %body,
        "Provider returned error"
    );

    let detail = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("error").map(upstream_error_message))
        .unwrap_or(body);
    Err(Error::upstream(provider, format!("{}: {}", status, detail)))
}

/// Parse a JSON body and read the string at `pointer`, failing on an `error` object.
async fn read_json_path(
    provider: &str,
    response: reqwest::Response,
    pointer: &str,
) -> Result<String> {
    let body: Value = response.json().await.map_err(|e| {
        let e = e.without_url();
        tracing::error!(provider = %provider, error = %e, "Failed to parse provider response");
        Error::upstream(provider, format!("malformed response body: {}", e))
    })?;
    json_path(provider, &body, pointer)
}

fn json_path(provider: &str, body: &Value, pointer: &str) -> Result<String> {
    if let Some(err) = body.get("error").filter(|e| !e.is_null()) {
        return Err(Error::upstream(provider, upstream_error_message(err)));
    }

    body.pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            Error::upstream(provider, format!("response is missing {}", pointer))
        })
}

fn byte_stream(response: reqwest::Response) -> ByteStream {
    response
        .bytes_stream()
        .map_err(|e| std::io::Error::other(e.without_url()))
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_path_reads_text() {
        let body = serde_json::json!({"choices": [{"message": {"content": "hi"}}]});
        assert_eq!(
            json_path("p", &body, "/choices/0/message/content").unwrap(),
            "hi"
        );
    }

    #[test]
    fn test_json_path_error_object() {
        let body = serde_json::json!({"error": {"message": "bad key"}});
        let err = json_path("p", &body, "/choices/0/message/content").unwrap_err();
        assert!(err.to_string().contains("bad key"));
    }

    #[test]
    fn test_json_path_missing() {
        let body = serde_json::json!({"choices": []});
        let err = json_path("p", &body, "/choices/0/message/content").unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
