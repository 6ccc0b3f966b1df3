//! Google Gemini `generateContent` API. The key travels in the query string.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use serde_json::json;

use super::{
    byte_stream, ensure_success, read_json_path, ChatProvider, ClientSettings, ProviderReply,
    UpstreamStream,
};
use crate::config::{ApiKey, ConfigError, ProviderConfig};
use crate::error::Result;
use crate::proxy::stream::gemini_delta;

pub struct Gemini {
    name: String,
    base_url: String,
    api_key: ApiKey,
    headers: HeaderMap,
    settings: ClientSettings,
}

impl Gemini {
    pub fn new(
        config: &ProviderConfig,
        headers: HeaderMap,
        settings: &ClientSettings,
    ) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| ConfigError::MissingKey {
            provider: config.name.clone(),
            var: crate::config::convention_env_var_name(&config.name),
        })?;

        Ok(Self {
            name: config.name.clone(),
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key,
            headers,
            settings: settings.clone(),
        })
    }

    fn endpoint(&self, model: &str, streaming: bool) -> String {
        let method = if streaming {
            "streamGenerateContent"
        } else {
            "generateContent"
        };
        format!("{}/models/{}:{}", self.base_url, model, method)
    }
}

#[async_trait]
impl ChatProvider for Gemini {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, prompt: &str, model: &str, streaming: bool) -> Result<ProviderReply> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }]
        });

        let mut request = self
            .settings
            .client
            .post(self.endpoint(model, streaming))
            .header(CONTENT_TYPE, "application/json")
            .headers(self.headers.clone())
            .query(&[("key", self.api_key.expose_secret())])
            .json(&body);

        if streaming {
            request = request.query(&[("alt", "sse")]);
        } else {
            request = request.timeout(self.settings.request_timeout);
        }

        tracing::debug!(provider = %self.name, model = %model, streaming, "Calling provider");

        let response = request.send().await.map_err(|e| {
            // The URL carries the key; never log it.
            let e = e.without_url();
            tracing::error!(error = %e, provider = %self.name, "Failed to reach provider");
            e
        })?;
        let response = ensure_success(&self.name, response).await?;

        if streaming {
            return Ok(ProviderReply::Stream(UpstreamStream {
                model: model.to_string(),
                body: byte_stream(response),
                extractor: gemini_delta,
            }));
        }

        let text =
            read_json_path(&self.name, response, "/candidates/0/content/parts/0/text").await?;
        Ok(ProviderReply::Text {
            text,
            model: model.to_string(),
        })
    }
}
