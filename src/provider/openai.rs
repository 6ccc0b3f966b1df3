//! OpenAI-compatible chat completions (OpenAI, DeepSeek, Together, OpenRouter, generic).

use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use serde::Serialize;

use super::{
    byte_stream, ensure_success, read_json_path, ChatProvider, ClientSettings, ProviderReply,
    UpstreamStream,
};
use crate::config::{ApiKey, ProviderConfig};
use crate::error::Result;
use crate::proxy::stream::openai_delta;

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    stream: bool,
}

pub struct OpenAiCompatible {
    name: String,
    endpoint: String,
    api_key: Option<ApiKey>,
    headers: HeaderMap,
    settings: ClientSettings,
}

impl OpenAiCompatible {
    pub fn new(config: &ProviderConfig, headers: HeaderMap, settings: &ClientSettings) -> Self {
        Self {
            name: config.name.clone(),
            endpoint: format!("{}/chat/completions", config.url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            headers,
            settings: settings.clone(),
        }
    }
}

#[async_trait]
impl ChatProvider for OpenAiCompatible {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, prompt: &str, model: &str, streaming: bool) -> Result<ProviderReply> {
        let body = ChatCompletionRequest {
            model,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            stream: streaming,
        };

        let mut request = self
            .settings
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .headers(self.headers.clone())
            .json(&body);

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }
        if !streaming {
            request = request.timeout(self.settings.request_timeout);
        }

        tracing::debug!(provider = %self.name, model = %model, streaming, "Calling provider");

        let response = request.send().await.map_err(|e| {
            tracing::error!(error = %e, provider = %self.name, "Failed to reach provider");
            e
        })?;
        let response = ensure_success(&self.name, response).await?;

        if streaming {
            return Ok(ProviderReply::Stream(UpstreamStream {
                model: model.to_string(),
                body: byte_stream(response),
                extractor: openai_delta,
            }));
        }

        let text = read_json_path(&self.name, response, "/choices/0/message/content").await?;
        Ok(ProviderReply::Text {
            text,
            model: model.to_string(),
        })
    }
}
