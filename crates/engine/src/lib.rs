//! Session-aware retrieval-augmented answering engine.
//!
//! Answers natural-language questions from an external passage index with
//! a single bounded generation call, tags every answer with its evidentiary
//! support, remembers each conversation in memory and batches completed
//! turns to durable storage.
//!
//! # Example
//! ```no_run
//! use lumen_core::AppConfig;
//! use lumen_engine::RagEngine;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = RagEngine::from_config(&AppConfig::load()?)?;
//! let result = engine.ask("What is edge detection?", "s1", false).await?;
//! println!("{} ({})", result.answer, result.support_level);
//! engine.cleanup("s1").await?;
//! engine.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod citations;
pub mod classifier;
pub mod context;
pub mod engine;
pub mod generator;
pub mod grounding;
pub mod persistence;
pub mod rerank;
pub mod retrieval;
pub mod session;
pub mod stats;
pub mod text;
pub mod types;

#[cfg(test)]
mod tests;

pub use classifier::QueryClassifier;
pub use engine::{EngineBuilder, RagEngine, ENGINE_VERSION};
pub use grounding::{GroundingScorer, GROUNDED_THRESHOLD, PARTIAL_THRESHOLD};
pub use persistence::{open_store, BufferState, StoreSummary, TurnRecord, TurnStore};
pub use rerank::{PassthroughReranker, Reranker};
pub use retrieval::{RetrievalService, Retriever, VectorSearchClient};
pub use session::SessionStore;
pub use stats::{StatsSnapshot, StatsTracker};
pub use types::{
    AnswerResult, Intent, QueryClassification, RetrievedChunk, Session, SupportLevel, Turn,
    NO_RESULTS_ANSWER,
};
