//! Prompt context assembly.

use crate::types::RetrievedChunk;

/// Render chunks as `[Source: label]` blocks in retrieval order.
///
/// Each passage is cut to at most `char_budget` characters (never splitting
/// a character). Labels are emitted verbatim so the model can cite them.
pub fn build_context(chunks: &[RetrievedChunk], char_budget: usize) -> String {
    chunks
        .iter()
        .map(|chunk| {
            format!(
                "[Source: {}]\n{}",
                chunk.citation_label,
                truncate_chars(&chunk.content, char_budget)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(label: &str, content: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: "c".to_string(),
            content: content.to_string(),
            citation_label: label.to_string(),
            page_number: None,
        }
    }

    #[test]
    fn test_blocks_in_order() {
        let context = build_context(
            &[chunk("Gonzalez", "Edges."), chunk("Szeliski", "Gradients.")],
            500,
        );
        assert_eq!(
            context,
            "[Source: Gonzalez]\nEdges.\n\n[Source: Szeliski]\nGradients."
        );
    }

    #[test]
    fn test_content_truncated_to_budget() {
        let long = "x".repeat(800);
        let context = build_context(&[chunk("A", &long)], 500);
        assert_eq!(context.len(), "[Source: A]\n".len() + 500);
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn test_empty_chunks() {
        assert_eq!(build_context(&[], 500), "");
    }
}
