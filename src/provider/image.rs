//! OpenAI image generation (DALL-E class models). No streaming.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use serde_json::json;

use super::{
    ensure_success, read_json_path, ChatProvider, ClientSettings, OutputKind, ProviderReply,
};
use crate::config::{ApiKey, ConfigError, ProviderConfig};
use crate::error::{Error, Result};

const IMAGE_SIZE: &str = "1024x1024";

pub struct OpenAiImage {
    name: String,
    endpoint: String,
    api_key: ApiKey,
    headers: HeaderMap,
    settings: ClientSettings,
}

impl OpenAiImage {
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
            endpoint: format!("{}/images/generations", config.url.trim_end_matches('/')),
            api_key,
            headers,
            settings: settings.clone(),
        })
    }
}

#[async_trait]
impl ChatProvider for OpenAiImage {
    fn name(&self) -> &str {
        &self.name
    }

    fn output(&self) -> OutputKind {
        OutputKind::Image
    }

    async fn invoke(&self, prompt: &str, model: &str, streaming: bool) -> Result<ProviderReply> {
        if streaming {
            return Err(Error::BadRequest(format!(
                "Model '{}' generates images and does not support streaming",
                model
            )));
        }

        let body = json!({
            "model": model,
            "prompt": prompt,
            "n": 1,
            "size": IMAGE_SIZE,
        });

        tracing::debug!(provider = %self.name, model = %model, "Requesting image generation");

        let response = self
            .settings
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .headers(self.headers.clone())
            .bearer_auth(self.api_key.expose_secret())
            .timeout(self.settings.request_timeout)
            .json(&body)
            .send()
            .await?;
        let response = ensure_success(&self.name, response).await?;

        let url = read_json_path(&self.name, response, "/data/0/url").await?;
        Ok(ProviderReply::Image {
            url,
            model: model.to_string(),
        })
    }
}
