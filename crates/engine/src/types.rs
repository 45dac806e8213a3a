//! Engine type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A passage returned by the retrieval service, normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedChunk {
    pub chunk_id: String,

    /// Passage text as returned by the service
    pub content: String,

    /// Human-readable source name the model is asked to cite
    pub citation_label: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<String>,
}

/// What a query is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    DomainQuestion,
    MemoryRecall,
    OutOfDomain,
    ChitChat,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::DomainQuestion => "domain_question",
            Intent::MemoryRecall => "memory_recall",
            Intent::OutOfDomain => "out_of_domain",
            Intent::ChitChat => "chit_chat",
        }
    }
}

/// Classifier output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryClassification {
    pub intent: Intent,

    /// Fraction of query terms found in the domain profile
    pub domain_relevance: f32,
}

impl QueryClassification {
    pub fn new(intent: Intent, domain_relevance: f32) -> Self {
        Self {
            intent,
            domain_relevance,
        }
    }
}

/// Evidentiary basis of an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportLevel {
    Grounded,
    PartiallyGrounded,
    Ungrounded,
    MemoryRecall,
    OutOfDomain,
    Error,
}

impl SupportLevel {
    pub const ALL: [SupportLevel; 6] = [
        SupportLevel::Grounded,
        SupportLevel::PartiallyGrounded,
        SupportLevel::Ungrounded,
        SupportLevel::MemoryRecall,
        SupportLevel::OutOfDomain,
        SupportLevel::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SupportLevel::Grounded => "grounded",
            SupportLevel::PartiallyGrounded => "partially_grounded",
            SupportLevel::Ungrounded => "ungrounded",
            SupportLevel::MemoryRecall => "memory_recall",
            SupportLevel::OutOfDomain => "out_of_domain",
            SupportLevel::Error => "error",
        }
    }

    /// Whether a confidence value is meaningful at this level.
    pub fn carries_confidence(&self) -> bool {
        matches!(
            self,
            SupportLevel::Grounded | SupportLevel::PartiallyGrounded | SupportLevel::Ungrounded
        )
    }

    pub fn index(&self) -> usize {
        match self {
            SupportLevel::Grounded => 0,
            SupportLevel::PartiallyGrounded => 1,
            SupportLevel::Ungrounded => 2,
            SupportLevel::MemoryRecall => 3,
            SupportLevel::OutOfDomain => 4,
            SupportLevel::Error => 5,
        }
    }
}

impl std::fmt::Display for SupportLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overlap score for a single sentence of the answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimScore {
    pub claim: String,
    pub score: f32,
}

/// Overlap between an answer and its evidence, in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GroundingScore {
    pub overall: f32,
    pub claims: Vec<ClaimScore>,
}

/// Result of one `ask`.
///
/// Build through the constructors so that `confidence` is present exactly
/// when the support level carries one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResult {
    pub answer: String,

    /// Labels in order of first appearance, duplicates kept
    pub citations: Vec<String>,

    pub support_level: SupportLevel,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,

    pub latency_ms: u64,

    pub chunks_retrieved: usize,

    pub query_classification: QueryClassification,

    #[serde(default)]
    pub retrieved_chunks: Vec<RetrievedChunk>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grounding_scores: Option<GroundingScore>,
}

/// Fixed reply when retrieval finds nothing.
pub const NO_RESULTS_ANSWER: &str = "No relevant information found.";

impl AnswerResult {
    /// A generated answer with its grounding assessment.
    #[allow(clippy::too_many_arguments)]
    pub fn generated(
        answer: String,
        citations: Vec<String>,
        support_level: SupportLevel,
        confidence: f32,
        latency_ms: u64,
        query_classification: QueryClassification,
        retrieved_chunks: Vec<RetrievedChunk>,
        grounding: GroundingScore,
    ) -> Self {
        Self {
            answer,
            citations,
            support_level,
            confidence: Some(confidence.clamp(0.0, 1.0)),
            latency_ms,
            chunks_retrieved: retrieved_chunks.len(),
            query_classification,
            retrieved_chunks,
            grounding_scores: Some(grounding),
        }
    }

    /// Retrieval returned nothing; generation was skipped.
    pub fn no_results(query_classification: QueryClassification, latency_ms: u64) -> Self {
        Self {
            answer: NO_RESULTS_ANSWER.to_string(),
            citations: Vec::new(),
            support_level: SupportLevel::Ungrounded,
            confidence: Some(0.0),
            latency_ms,
            chunks_retrieved: 0,
            query_classification,
            retrieved_chunks: Vec::new(),
            grounding_scores: None,
        }
    }

    /// A reply that never touched retrieval or generation.
    pub fn short_circuit(
        answer: String,
        support_level: SupportLevel,
        query_classification: QueryClassification,
        latency_ms: u64,
    ) -> Self {
        debug_assert!(!support_level.carries_confidence());
        Self {
            answer,
            citations: Vec::new(),
            support_level,
            confidence: None,
            latency_ms,
            chunks_retrieved: 0,
            query_classification,
            retrieved_chunks: Vec::new(),
            grounding_scores: None,
        }
    }

    /// An upstream failure converted into a normal result.
    pub fn error(
        message: String,
        query_classification: QueryClassification,
        retrieved_chunks: Vec<RetrievedChunk>,
        latency_ms: u64,
    ) -> Self {
        Self {
            answer: message,
            citations: Vec::new(),
            support_level: SupportLevel::Error,
            confidence: None,
            latency_ms,
            chunks_retrieved: retrieved_chunks.len(),
            query_classification,
            retrieved_chunks,
            grounding_scores: None,
        }
    }

    /// Confidence, only where it is meaningful.
    pub fn confidence(&self) -> Option<f32> {
        if self.support_level.carries_confidence() {
            self.confidence
        } else {
            None
        }
    }
}

/// One question and its answer. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub query: String,
    pub answer: AnswerResult,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(query: impl Into<String>, answer: AnswerResult) -> Self {
        Self {
            query: query.into(),
            answer,
            timestamp: Utc::now(),
        }
    }
}

/// Conversational state for one caller-supplied session id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub turns: Vec<Turn>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            created_at: now,
            last_activity_at: now,
            turns: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classification() -> QueryClassification {
        QueryClassification::new(Intent::DomainQuestion, 1.0)
    }

    #[test]
    fn test_confidence_only_where_meaningful() {
        let recall = AnswerResult::short_circuit(
            "You asked nothing yet.".to_string(),
            SupportLevel::MemoryRecall,
            QueryClassification::new(Intent::MemoryRecall, 0.0),
            1,
        );
        assert_eq!(recall.confidence(), None);

        let error = AnswerResult::error("boom".to_string(), classification(), Vec::new(), 3);
        assert_eq!(error.confidence(), None);
        assert!(error.citations.is_empty());

        let empty = AnswerResult::no_results(classification(), 2);
        assert_eq!(empty.confidence(), Some(0.0));
        assert_eq!(empty.support_level, SupportLevel::Ungrounded);
        assert_eq!(empty.chunks_retrieved, 0);
    }

    #[test]
    fn test_generated_clamps_confidence() {
        let result = AnswerResult::generated(
            "a".to_string(),
            Vec::new(),
            SupportLevel::Grounded,
            1.7,
            10,
            classification(),
            Vec::new(),
            GroundingScore::default(),
        );
        assert_eq!(result.confidence(), Some(1.0));
    }

    #[test]
    fn test_answer_result_uses_camel_case_keys() {
        let json = serde_json::to_value(AnswerResult::no_results(classification(), 2)).unwrap();
        assert_eq!(json["supportLevel"], "ungrounded");
        assert_eq!(json["latencyMs"], 2);
        assert_eq!(json["chunksRetrieved"], 0);
        assert!(json["queryClassification"].is_object());
        assert!(json.get("support_level").is_none());
    }

    #[test]
    fn test_support_level_serialization() {
        let json = serde_json::to_string(&SupportLevel::PartiallyGrounded).unwrap();
        assert_eq!(json, "\"partially_grounded\"");
        for level in SupportLevel::ALL {
            assert_eq!(SupportLevel::ALL[level.index()], level);
        }
    }
}
