//! Term extraction shared by the classifier and the grounding scorer.

use std::collections::HashSet;
use std::sync::LazyLock;

/// Words that carry no topical signal, including question scaffolding.
static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "the", "is", "at", "which", "on", "a", "an", "as", "are", "was", "were", "for", "to",
        "of", "in", "and", "or", "but", "with", "by", "from", "this", "that", "be", "have",
        "has", "had", "it", "its", "their", "they", "them", "what", "how", "why", "when",
        "where", "who", "whom", "does", "did", "do", "can", "could", "would", "should", "will",
        "about", "explain", "describe", "define", "tell", "work", "works", "into", "than",
        "then", "there", "these", "those", "also", "such", "used", "use", "using", "between",
        "each", "other", "more", "most", "some", "any", "not", "only", "very", "your", "you",
        "our", "please", "give", "show", "mean", "means", "like", "one", "two", "may", "been",
        "being", "which", "while", "over", "under", "all", "both", "well", "source",
    ]
    .into_iter()
    .collect()
});

/// Lowercased alphanumeric tokens.
pub fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Light plural folding so "images" meets "image" and "cnns" meets "cnn".
pub fn stem(word: &str) -> String {
    if word.len() > 4 && word.ends_with("ies") {
        format!("{}y", &word[..word.len() - 3])
    } else if word.len() > 3 && word.ends_with('s') && !word.ends_with("ss") {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}

/// Topical terms: tokens longer than two characters, stop words removed, stemmed.
pub fn content_terms(text: &str) -> Vec<String> {
    tokens(text)
        .into_iter()
        .filter(|t| t.chars().count() > 2 && !STOP_WORDS.contains(t.as_str()))
        .map(|t| stem(&t))
        .collect()
}

/// Split text into trimmed, non-empty sentences.
pub fn sentences(text: &str) -> Vec<&str> {
    text.split(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}
