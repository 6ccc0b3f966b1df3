//! ZIP-based formats: plain archives and Word (OOXML) documents.

use std::io::{Cursor, Read};
use std::sync::OnceLock;

use regex::Regex;
use zip::ZipArchive;

use super::{ExtractError, BINARY_MARKER};

/// Part of an OOXML package holding the main document body.
const DOCX_BODY_PART: &str = "word/document.xml";

/// Render every file entry of a ZIP archive as a labelled text block, in archive order.
///
/// At most `max_bytes` of decompressed content is read across all entries. Once
/// the budget is spent the output ends with a truncation notice.
pub(super) fn extract_zip(
    data: &[u8],
    archive_name: &str,
    max_bytes: usize,
) -> Result<String, ExtractError> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;
    let mut out = format!("Archive: {}\n\n", archive_name);
    let mut remaining = max_bytes;

    for index in 0..archive.len() {
        let entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();

        // One byte past the budget tells a full read apart from a cut one.
        let mut raw = Vec::new();
        entry.take(remaining as u64 + 1).read_to_end(&mut raw)?;
        let truncated = raw.len() > remaining;
        raw.truncate(remaining);
        remaining -= raw.len();

        let content = decode_entry(raw, truncated);
        out.push_str(&format!("--- File: {} ---\n{}\n\n", name, content));

        if truncated {
            tracing::warn!(
                archive = %archive_name,
                entry = %name,
                limit = max_bytes,
                "Archive content exceeds extraction limit, truncating"
            );
            out.push_str(&truncation_notice(max_bytes));
            break;
        }
    }

    Ok(out.trim_end().to_string())
}

fn truncation_notice(limit: usize) -> String {
    format!("[archive truncated: extracted content exceeds {} bytes]", limit)
}

/// Decode an entry as UTF-8. A cut entry may end mid-character; that tail is dropped.
fn decode_entry(raw: Vec<u8>, truncated: bool) -> String {
    match String::from_utf8(raw) {
        Ok(text) => text,
        Err(e) if truncated && e.utf8_error().error_len().is_none() => {
            let valid = e.utf8_error().valid_up_to();
            let mut bytes = e.into_bytes();
            bytes.truncate(valid);
            String::from_utf8(bytes).unwrap_or_else(|_| BINARY_MARKER.to_string())
        }
        Err(_) => BINARY_MARKER.to_string(),
    }
}

fn paragraph_end() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"</w:p>|<w:br\s*/>").expect("static regex"))
}

fn run_text() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>").expect("static regex"))
}

/// Extract raw text from a `.docx`, one line per paragraph, ignoring formatting.
///
/// Fails when the document body decompresses to more than `max_bytes`.
pub(super) fn extract_docx(data: &[u8], max_bytes: usize) -> Result<String, ExtractError> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;
    let body = archive
        .by_name(DOCX_BODY_PART)
        .map_err(|_| ExtractError::Other(format!("missing {} part", DOCX_BODY_PART)))?;

    let mut raw = Vec::new();
    body.take(max_bytes as u64 + 1).read_to_end(&mut raw)?;
    if raw.len() > max_bytes {
        return Err(ExtractError::TooLarge { limit: max_bytes });
    }

    Ok(document_text(&String::from_utf8_lossy(&raw)))
}

fn document_text(xml: &str) -> String {
    let mut lines = Vec::new();
    for paragraph in paragraph_end().split(xml) {
        let line: String = run_text()
            .captures_iter(paragraph)
            .map(|c| decode_entities(&c[1]))
            .collect();
        if !line.trim().is_empty() {
            lines.push(line);
        }
    }
    lines.join("\n")
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
