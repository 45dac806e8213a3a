//! Inline citation extraction.
//!
//! Generated answers mark their sources as `[Source: label]`.

use regex::Regex;
use std::sync::LazyLock;

static CITATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[Source:([^\]]+)\]").expect("valid citation pattern"));

/// Extract citation labels in order of appearance. Duplicates are kept.
pub fn extract(answer: &str) -> Vec<String> {
    CITATION_RE
        .captures_iter(answer)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|label| !label.is_empty())
        .collect()
}

/// Remove citation tags, leaving the prose.
pub fn strip(answer: &str) -> String {
    CITATION_RE.replace_all(answer, " ").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_and_duplicates_preserved() {
        let text = "Edges are gradients [Source: A]. Sobel approximates them [Source: B]. \
                    Canny thins them [Source: A].";
        assert_eq!(extract(text), vec!["A", "B", "A"]);
    }

    #[test]
    fn test_no_tags() {
        assert!(extract("An answer without sources.").is_empty());
    }

    #[test]
    fn test_labels_are_trimmed() {
        let text = "[Source:Gonzalez & Woods, ch. 10] and [Source:   Szeliski  ]";
        assert_eq!(extract(text), vec!["Gonzalez & Woods, ch. 10", "Szeliski"]);
    }

    #[test]
    fn test_malformed_tags_ignored() {
        assert!(extract("[Source: ] [Source A] [source: B]").is_empty());
    }

    #[test]
    fn test_strip() {
        assert_eq!(strip("Edges [Source: A] matter.").split_whitespace().collect::<Vec<_>>(),
            vec!["Edges", "matter."]);
    }
}
