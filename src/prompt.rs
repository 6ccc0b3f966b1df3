//! Prompt composition.

/// Merge the user's prompt with text extracted from an uploaded file.
///
/// With no extracted text the prompt is returned byte-for-byte unchanged.
pub fn compose(user_prompt: &str, extracted_text: &str) -> String {
    if extracted_text.is_empty() {
        return user_prompt.to_string();
    }

    format!(
        "{}\n\n--- Attached file content ---\n{}\n--- End of file content ---",
        user_prompt, extracted_text
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_extraction_is_identity() {
        for prompt in ["", "draw a cat", "  padded\n", "ünïcødé 🦀"] {
            assert_eq!(compose(prompt, "").as_bytes(), prompt.as_bytes());
        }
    }

    #[test]
    fn test_prompt_precedes_file_block() {
        let composed = compose("Summarize this", "line one\nline two");
        let prompt_at = composed.find("Summarize this").unwrap();
        let block_at = composed.find("--- Attached file content ---").unwrap();
        let text_at = composed.find("line one\nline two").unwrap();
        assert!(prompt_at < block_at && block_at < text_at);
        assert!(composed.ends_with("--- End of file content ---"));
    }
}
