//! Request and response types for the chat endpoints.

use axum::async_trait;
use axum::body::Bytes;
use axum::extract::multipart::MultipartError;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use super::server::AppState;
use crate::error::Error;
use crate::extract::UploadedFile;

/// Message returned when the prompt is missing or blank.
pub const PROMPT_REQUIRED: &str = "Prompt is required";

/// JSON request body for `/api/chat` and `/api/chat-stream`.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct ChatRequestBody {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

/// A chat request read from either a JSON or a multipart body.
#[derive(Debug, Default)]
pub struct ChatForm {
    pub prompt: Option<String>,
    pub model: Option<String>,
    pub file: Option<UploadedFile>,
}

impl ChatForm {
    /// The prompt, or a validation error when it is missing or blank.
    pub fn require_prompt(&self) -> Result<&str, Error> {
        match self.prompt.as_deref() {
            Some(p) if !p.trim().is_empty() => Ok(p),
            _ => Err(Error::Validation(PROMPT_REQUIRED.to_string())),
        }
    }

    async fn from_multipart(mut multipart: Multipart, limit: usize) -> Result<Self, Error> {
        let mut form = ChatForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(e, limit))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "prompt" => {
                    form.prompt = Some(field.text().await.map_err(|e| multipart_error(e, limit))?)
                }
                "model" => {
                    form.model = Some(field.text().await.map_err(|e| multipart_error(e, limit))?)
                }
                "file" => {
                    let file_name = field.file_name().unwrap_or("upload").to_string();
                    let mime_type = field
                        .content_type()
                        .unwrap_or("application/octet-stream")
                        .to_string();
                    let bytes = field.bytes().await.map_err(|e| multipart_error(e, limit))?;

                    if bytes.len() > limit {
                        return Err(Error::PayloadTooLarge { limit });
                    }
                    // Browsers send an empty part when no file was chosen.
                    if !bytes.is_empty() {
                        tracing::debug!(
                            file_name = %file_name,
                            mime_type = %mime_type,
                            bytes = bytes.len(),
                            "File upload received"
                        );
                        form.file = Some(UploadedFile::new(bytes, mime_type, file_name));
                    }
                }
                other => tracing::debug!(field = %other, "Ignoring unknown multipart field"),
            }
        }

        Ok(form)
    }

    fn from_json(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(ChatForm::default());
        }

        let body: ChatRequestBody = serde_json::from_slice(bytes)
            .map_err(|e| Error::BadRequest(format!("malformed JSON body: {}", e)))?;
        Ok(ChatForm {
            prompt: body.prompt,
            model: body.model,
            file: None,
        })
    }
}

fn multipart_error(e: MultipartError, limit: usize) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge { limit }
    } else {
        Error::BadRequest(e.body_text())
    }
}

#[async_trait]
impl FromRequest<AppState> for ChatForm {
    type Rejection = Error;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let limit = state.config.server.max_upload_bytes;
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("multipart/form-data"));

        if is_multipart {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| Error::BadRequest(e.body_text()))?;
            return Self::from_multipart(multipart, limit).await;
        }

        let bytes = Bytes::from_request(req, state).await.map_err(|e| {
            if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                Error::PayloadTooLarge { limit }
            } else {
                Error::BadRequest(e.body_text())
            }
        })?;
        Self::from_json(&bytes)
    }
}

/// Successful `/api/chat` body for text adapters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub model: String,
}

/// Successful `/api/chat` body for image adapters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResponse {
    pub image_url: String,
    pub model: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_prompt_is_rejected() {
        for prompt in [None, Some(""), Some("  \n")] {
            let form = ChatForm {
                prompt: prompt.map(str::to_string),
                ..ChatForm::default()
            };
            let err = form.require_prompt().unwrap_err();
            assert_eq!(err.to_string(), PROMPT_REQUIRED);
        }
    }

    #[test]
    fn test_json_body() {
        let form = ChatForm::from_json(br#"{"prompt":"hi","model":"openai/gpt-4o"}"#).unwrap();
        assert_eq!(form.require_prompt().unwrap(), "hi");
        assert_eq!(form.model.as_deref(), Some("openai/gpt-4o"));
    }

    #[test]
    fn test_empty_body_has_no_prompt() {
        let form = ChatForm::from_json(b"").unwrap();
        assert!(form.require_prompt().is_err());
    }

    #[test]
    fn test_malformed_json_is_bad_request() {
        let err = ChatForm::from_json(b"{nope").unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[test]
    fn test_image_response_is_camel_case() {
        let json = serde_json::to_value(ImageResponse {
            image_url: "https://img".to_string(),
            model: "dall-e-3".to_string(),
        })
        .unwrap();
        assert_eq!(json["imageUrl"], "https://img");
    }
}
