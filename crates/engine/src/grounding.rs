//! Grounding and confidence scoring.
//!
//! The metric is lexical support: the fraction of the answer's topical terms
//! (citation tags removed, stop words dropped, plurals folded) that occur
//! anywhere in the retrieved passages. Citation tags themselves earn nothing,
//! so an answer that cites a source without using it scores low, and an
//! answer that uses a source without citing it scores high.

use crate::citations;
use crate::text::{content_terms, sentences};
use crate::types::{ClaimScore, GroundingScore, RetrievedChunk, SupportLevel};
use std::collections::HashSet;

/// Overlap at or above which an answer is `grounded`.
pub const GROUNDED_THRESHOLD: f32 = 0.60;

/// Overlap at or above which an answer is `partially_grounded`.
pub const PARTIAL_THRESHOLD: f32 = 0.30;

/// Outcome of scoring one answer.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundingAssessment {
    pub score: GroundingScore,

    /// Monotonic in `score.overall`, clamped to [0, 1]
    pub confidence: f32,

    pub support_level: SupportLevel,
}

/// Scores answers against their evidence.
#[derive(Debug, Clone)]
pub struct GroundingScorer {
    grounded_threshold: f32,
    partial_threshold: f32,
}

impl Default for GroundingScorer {
    fn default() -> Self {
        Self {
            grounded_threshold: GROUNDED_THRESHOLD,
            partial_threshold: PARTIAL_THRESHOLD,
        }
    }
}

impl GroundingScorer {
    /// Scorer with custom thresholds; `partial` must not exceed `grounded`.
    pub fn with_thresholds(grounded: f32, partial: f32) -> Self {
        let grounded = grounded.clamp(0.0, 1.0);
        Self {
            grounded_threshold: grounded,
            partial_threshold: partial.clamp(0.0, grounded),
        }
    }

    pub fn score(&self, answer: &str, chunks: &[RetrievedChunk]) -> GroundingAssessment {
        let evidence: HashSet<String> = chunks
            .iter()
            .flat_map(|chunk| content_terms(&chunk.content))
            .collect();

        let prose = citations::strip(answer);
        let overall = overlap(&content_terms(&prose), &evidence);

        let claims = sentences(&prose)
            .into_iter()
            .filter_map(|sentence| {
                let terms = content_terms(sentence);
                if terms.is_empty() {
                    return None;
                }
                Some(ClaimScore {
                    claim: sentence.to_string(),
                    score: overlap(&terms, &evidence),
                })
            })
            .collect();

        let support_level = self.classify(overall);

        tracing::debug!(
            overall = overall,
            support = %support_level,
            evidence_terms = evidence.len(),
            "Scored answer grounding"
        );

        GroundingAssessment {
            score: GroundingScore { overall, claims },
            confidence: overall.clamp(0.0, 1.0),
            support_level,
        }
    }

    fn classify(&self, overall: f32) -> SupportLevel {
        if overall >= self.grounded_threshold {
            SupportLevel::Grounded
        } else if overall >= self.partial_threshold {
            SupportLevel::PartiallyGrounded
        } else {
            SupportLevel::Ungrounded
        }
    }
}

fn overlap(terms: &[String], evidence: &HashSet<String>) -> f32 {
    if terms.is_empty() {
        return 0.0;
    }
    let supported = terms.iter().filter(|t| evidence.contains(*t)).count();
    supported as f32 / terms.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(label: &str, content: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: label.to_lowercase(),
            content: content.to_string(),
            citation_label: label.to_string(),
            page_number: None,
        }
    }

    fn evidence() -> Vec<RetrievedChunk> {
        vec![
            chunk(
                "Gonzalez",
                "Edge detection finds boundaries where image intensity changes sharply.",
            ),
            chunk(
                "Szeliski",
                "The Sobel operator approximates the intensity gradient with convolution kernels.",
            ),
        ]
    }

    #[test]
    fn test_supported_answer_is_grounded() {
        let answer = "Edge detection finds boundaries where intensity changes sharply [Source: Gonzalez]. \
                      The Sobel operator approximates the gradient [Source: Szeliski].";
        let result = GroundingScorer::default().score(answer, &evidence());

        assert_eq!(result.support_level, SupportLevel::Grounded);
        assert!(result.confidence >= GROUNDED_THRESHOLD);
        assert_eq!(result.score.claims.len(), 2);
    }

    #[test]
    fn test_citation_without_support_is_ungrounded() {
        let answer = "Bananas ripen faster beside apples in warm kitchens [Source: Gonzalez].";
        let result = GroundingScorer::default().score(answer, &evidence());

        assert_eq!(result.support_level, SupportLevel::Ungrounded);
        assert!(result.confidence < PARTIAL_THRESHOLD);
    }

    #[test]
    fn test_support_without_citation_counts() {
        let answer = "Edge detection finds boundaries where image intensity changes sharply.";
        let result = GroundingScorer::default().score(answer, &evidence());
        assert_eq!(result.support_level, SupportLevel::Grounded);
    }

    #[test]
    fn test_mixed_answer_is_partial() {
        // Half the terms come from the evidence.
        let answer = "Sobel gradient convolution kernels, bananas apples kitchens oranges.";
        let result = GroundingScorer::default().score(answer, &evidence());
        assert_eq!(result.support_level, SupportLevel::PartiallyGrounded);
        assert!((result.score.overall - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_empty_inputs() {
        let scorer = GroundingScorer::default();
        assert_eq!(scorer.score("", &evidence()).confidence, 0.0);
        assert_eq!(
            scorer.score("Edges matter.", &[]).support_level,
            SupportLevel::Ungrounded
        );
    }

    #[test]
    fn test_confidence_is_monotonic_in_overlap() {
        let scorer = GroundingScorer::default();
        let low = scorer.score("Sobel bananas apples kitchens", &evidence());
        let high = scorer.score("Sobel gradient kernels apples", &evidence());
        assert!(high.score.overall > low.score.overall);
        assert!(high.confidence > low.confidence);
    }

    #[test]
    fn test_custom_thresholds() {
        let scorer = GroundingScorer::with_thresholds(0.9, 0.95);
        let result = scorer.score("Sobel gradient convolution kernels, bananas apples kitchens oranges.", &evidence());
        // partial is clamped to grounded, so 0.5 is below both
        assert_eq!(result.support_level, SupportLevel::Ungrounded);
    }
}
