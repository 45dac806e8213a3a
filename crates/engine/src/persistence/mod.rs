//! Durable turn log.
//!
//! Completed turns are written append-only, one record per turn, through a
//! [`TurnStore`]. Writes are batched by the [`PersistenceBuffer`].

pub mod buffer;
pub mod jsonl;
pub mod sqlite;

pub use buffer::{BufferState, FlushPolicy, PersistenceBuffer};
pub use jsonl::JsonlTurnStore;
pub use sqlite::SqliteTurnStore;

use crate::types::{SupportLevel, Turn};
use chrono::{DateTime, Utc};
use lumen_core::{AppResult, PersistenceBackend};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// One persisted turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRecord {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub query: String,
    pub answer: String,
    pub citations: Vec<String>,
    pub support_level: SupportLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    pub latency_ms: u64,
}

impl TurnRecord {
    pub fn from_turn(session_id: &str, turn: &Turn) -> Self {
        Self {
            session_id: session_id.to_string(),
            timestamp: turn.timestamp,
            query: turn.query.clone(),
            answer: turn.answer.answer.clone(),
            citations: turn.answer.citations.clone(),
            support_level: turn.answer.support_level,
            confidence: turn.answer.confidence(),
            latency_ms: turn.answer.latency_ms,
        }
    }
}

/// Totals over everything persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSummary {
    pub turns: usize,
    pub sessions: usize,
}

/// Append-only storage for turn records.
///
/// Calls are blocking; the buffer runs them off the async executor.
pub trait TurnStore: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Append a batch, preserving order. A failed batch may be retried whole.
    fn append(&self, records: &[TurnRecord]) -> AppResult<()>;

    /// All records for a session, oldest first. Unknown ids yield an empty list.
    fn load_session(&self, session_id: &str) -> AppResult<Vec<TurnRecord>>;

    fn summary(&self) -> AppResult<StoreSummary>;
}

/// Open the store for `backend` at `path`, creating parent directories.
pub fn open_store(backend: PersistenceBackend, path: &Path) -> AppResult<Arc<dyn TurnStore>> {
    let store: Arc<dyn TurnStore> = match backend {
        PersistenceBackend::Jsonl => Arc::new(JsonlTurnStore::new(path)?),
        PersistenceBackend::Sqlite => Arc::new(SqliteTurnStore::open(path)?),
    };
    tracing::debug!(backend = store.name(), path = %path.display(), "Opened turn store");
    Ok(store)
}
