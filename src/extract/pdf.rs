//! PDF text extraction through `pdf_oxide`, one paragraph per page.

use std::io::Write;
use std::path::Path;

use pdf_oxide::PdfDocument;

use super::ExtractError;

fn extract_pages(path: &Path, max_bytes: usize) -> Result<Vec<String>, ExtractError> {
    let mut doc = PdfDocument::open(path).map_err(|e| ExtractError::Pdf(e.to_string()))?;

    let page_count = doc
        .page_count()
        .map_err(|e| ExtractError::Pdf(format!("failed to read page count: {e}")))?;

    let mut pages = Vec::with_capacity(page_count);
    let mut total = 0usize;
    for page_index in 0..page_count {
        let text = match doc.extract_text(page_index) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(page = page_index, error = %e, "Failed to extract PDF page text");
                continue;
            }
        };
        let text = text.trim();
        if text.is_empty() {
            tracing::debug!(page = page_index, "PDF page has no text");
            continue;
        }

        total += text.len();
        if total > max_bytes {
            tracing::warn!(
                page = page_index,
                page_count,
                limit = max_bytes,
                "PDF text exceeds extraction limit, remaining pages skipped"
            );
            break;
        }
        pages.push(text.to_string());
    }

    Ok(pages)
}

/// Parse a PDF into plain text, pages joined by a blank line in page order.
///
/// Blocking. The bytes are spooled to a temporary file which is removed when
/// this function returns, whichever way it returns.
pub(super) fn extract_pdf(data: &[u8], max_bytes: usize) -> Result<String, ExtractError> {
    let mut temp_file = tempfile::NamedTempFile::new()?;
    temp_file.write_all(data)?;
    temp_file.flush()?;

    let pages = extract_pages(temp_file.path(), max_bytes)?;
    tracing::info!(page_count = pages.len(), "PDF text extraction complete");

    Ok(pages.join("\n\n"))
}
