//! Query intent classification.
//!
//! Runs before any retrieval or generation so that questions the corpus
//! cannot answer cost nothing upstream.

use crate::text::{content_terms, stem, tokens};
use crate::types::{Intent, QueryClassification, Turn};
use lumen_core::DomainProfile;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Phrases that refer to the conversation itself.
static RECALL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\bwhat (did|was|were) (i|my)\b.*\b(ask|asked|question|questions|say|said|type|typed)\b",
        r"\b(my|the) (last|previous|prior|earlier|first|latest) (question|query|message)s?\b",
        r"\bwhat did you (just )?(say|tell|answer|reply)\b",
        r"\b(your|the) (last|previous|prior|earlier) (answer|reply|response)\b",
        r"\bwhat have we (talked|discussed|covered)\b",
        r"\b(repeat|remind me of) (my|the|your) (question|answer)\b",
        r"\b(earlier|so far) in (this|our) (conversation|chat|session)\b",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){}", p)).expect("valid recall pattern"))
    .collect()
});

const GREETINGS: [&str; 14] = [
    "hi",
    "hello",
    "hey",
    "thanks",
    "thank you",
    "thx",
    "good morning",
    "good afternoon",
    "good evening",
    "how are you",
    "bye",
    "goodbye",
    "see you",
    "who are you",
];

/// Pronouns that make a short query a follow-up to the previous turn.
const FOLLOW_UP_MARKERS: [&str; 8] = ["it", "its", "that", "this", "they", "them", "those", "these"];

/// Labels queries as domain questions, recall requests, small talk or off-topic.
#[derive(Debug, Clone)]
pub struct QueryClassifier {
    domain_terms: HashSet<String>,
    min_relevance: f32,
}

impl QueryClassifier {
    pub fn new(profile: &DomainProfile) -> Self {
        let domain_terms = profile
            .keywords
            .iter()
            .flat_map(|k| tokens(k))
            .map(|t| stem(&t))
            .collect();

        Self {
            domain_terms,
            min_relevance: profile.min_relevance,
        }
    }

    /// Classify `query`, given the session's most recent turns (oldest first).
    pub fn classify(&self, query: &str, recent: &[Turn]) -> QueryClassification {
        if RECALL_PATTERNS.iter().any(|re| re.is_match(query)) {
            return QueryClassification::new(Intent::MemoryRecall, 0.0);
        }

        let relevance = self.domain_relevance(query);

        if relevance == 0.0 && is_greeting(query) {
            return QueryClassification::new(Intent::ChitChat, relevance);
        }

        if relevance >= self.min_relevance && relevance > 0.0 || self.domain_terms.is_empty() {
            return QueryClassification::new(Intent::DomainQuestion, relevance);
        }

        if is_follow_up(query, recent) {
            tracing::debug!("Treating query as follow-up to previous domain question");
            return QueryClassification::new(Intent::DomainQuestion, relevance);
        }

        QueryClassification::new(Intent::OutOfDomain, relevance)
    }

    /// Fraction of the query's topical terms that belong to the domain profile.
    pub fn domain_relevance(&self, query: &str) -> f32 {
        if self.domain_terms.is_empty() {
            return 1.0;
        }
        let terms = content_terms(query);
        if terms.is_empty() {
            return 0.0;
        }
        let hits = terms.iter().filter(|t| self.domain_terms.contains(*t)).count();
        hits as f32 / terms.len() as f32
    }
}

fn is_greeting(query: &str) -> bool {
    let normalized = tokens(query).join(" ");
    GREETINGS
        .iter()
        .any(|g| normalized == *g || normalized.starts_with(&format!("{} ", g)))
}

fn is_follow_up(query: &str, recent: &[Turn]) -> bool {
    let previous_was_domain = recent
        .last()
        .map(|turn| turn.answer.query_classification.intent == Intent::DomainQuestion)
        .unwrap_or(false);
    if !previous_was_domain {
        return false;
    }
    let words = tokens(query);
    words.len() <= 8 && words.iter().any(|w| FOLLOW_UP_MARKERS.contains(&w.as_str()))
}

/// Reply for a memory-recall query, built from the session's own turns.
pub fn recall_answer(recent: &[Turn]) -> String {
    match recent.last() {
        None => "You haven't asked anything yet in this session.".to_string(),
        Some(last) => {
            let mut answer = format!("Your previous question was: \"{}\"", last.query);
            if recent.len() > 1 {
                let earlier: Vec<String> = recent[..recent.len() - 1]
                    .iter()
                    .map(|t| format!("\"{}\"", t.query))
                    .collect();
                answer.push_str(&format!("\nBefore that you asked: {}", earlier.join(", ")));
            }
            answer
        }
    }
}

/// Reply for small talk.
pub fn chit_chat_answer(domain_name: &str) -> String {
    format!(
        "Hello! I answer questions about {} from my reference documents. What would you like to know?",
        domain_name
    )
}

/// Reply for a query outside the domain.
pub fn out_of_domain_answer(domain_name: &str) -> String {
    format!(
        "That question is outside my knowledge domain. I can only answer questions about {}.",
        domain_name
    )
}
