//! File-to-text normalization.
//!
//! Turns an uploaded file into plain text that can be appended to a prompt.
//! [`extract`] never fails: every problem degrades to a bracketed placeholder
//! so the surrounding request keeps going.

mod archive;
mod pdf;

use std::time::Duration;

use bytes::Bytes;

/// Upper bound on any single blocking parse.
const EXTRACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Marker used for archive entries that are not valid UTF-8.
pub const BINARY_MARKER: &str = "[binary content, not shown]";

/// A file received with a chat request. Owned by the request and dropped after extraction.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub bytes: Bytes,
    pub mime_type: String,
    pub file_name: String,
}

impl UploadedFile {
    pub fn new(
        bytes: impl Into<Bytes>,
        mime_type: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
            file_name: file_name.into(),
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Failure inside one of the format-specific extractors.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ExtractError {
    #[error("failed to parse PDF: {0}")]
    Pdf(String),

    #[error("invalid archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("extracted content exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Coarse classification of a declared MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Pdf,
    WordDocument,
    Archive,
    Text,
    Image,
    Unsupported,
}

impl FileKind {
    fn from_mime(mime: &str) -> Self {
        // Drop parameters such as `; charset=utf-8`.
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "application/pdf" => FileKind::Pdf,
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                FileKind::WordDocument
            }
            "application/zip" | "application/x-zip-compressed" => FileKind::Archive,
            "application/json"
            | "application/javascript"
            | "application/x-javascript"
            | "application/xml"
            | "application/xhtml+xml" => FileKind::Text,
            m if m.starts_with("text/") => FileKind::Text,
            m if m.starts_with("image/") => FileKind::Image,
            _ => FileKind::Unsupported,
        }
    }
}

/// Run a synchronous parser off the async workers, bounded by [`EXTRACTION_TIMEOUT`].
async fn run_blocking<F>(parse: F) -> Result<String, ExtractError>
where
    F: FnOnce() -> Result<String, ExtractError> + Send + 'static,
{
    tokio::time::timeout(EXTRACTION_TIMEOUT, tokio::task::spawn_blocking(parse))
        .await
        .map_err(|_| ExtractError::Other("extraction timed out".to_string()))?
        .map_err(|e| ExtractError::Other(format!("task join error: {e}")))?
}

/// Extract prompt-ready text from an optional upload.
///
/// Returns an empty string when there is no file. Never returns an error.
/// Container formats stop decompressing once `max_bytes` of content is read.
#[tracing::instrument(
    skip(file),
    fields(
        file_name = file.map(|f| f.file_name.as_str()),
        mime_type = file.map(|f| f.mime_type.as_str()),
    )
)]
pub async fn extract(file: Option<&UploadedFile>, max_bytes: usize) -> String {
    let Some(file) = file else {
        return String::new();
    };

    let result = match FileKind::from_mime(&file.mime_type) {
        FileKind::Pdf => {
            let data = file.bytes.clone();
            run_blocking(move || pdf::extract_pdf(&data, max_bytes)).await
        }
        FileKind::WordDocument => {
            let data = file.bytes.clone();
            run_blocking(move || archive::extract_docx(&data, max_bytes)).await
        }
        FileKind::Archive => {
            let data = file.bytes.clone();
            let name = file.file_name.clone();
            run_blocking(move || archive::extract_zip(&data, &name, max_bytes)).await
        }
        FileKind::Text => Ok(String::from_utf8_lossy(&file.bytes).into_owned()),
        FileKind::Image => Ok(format!(
            "[Image file: {} ({}) - image content is not included as text]",
            file.file_name, file.mime_type
        )),
        FileKind::Unsupported => {
            tracing::warn!("Unsupported upload type");
            Ok(format!(
                "[Unsupported file type: {} (file: {})]",
                file.mime_type, file.file_name
            ))
        }
    };

    match result {
        Ok(text) => {
            tracing::debug!(chars = text.len(), "File text extracted");
            text
        }
        Err(e) => {
            tracing::error!(error = %e, "File extraction failed");
            format!("[Error processing file {}: {}]", file.file_name, e)
        }
    }
}
