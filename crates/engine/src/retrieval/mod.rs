//! Passage retrieval.
//!
//! Wraps a [`RetrievalService`] with the engine's column layout, result
//! count and timeout, and normalizes raw rows into [`RetrievedChunk`]s.

pub mod service;
pub mod vector_search;

pub use service::{RetrievalService, SearchRow};
pub use vector_search::VectorSearchClient;

use crate::types::RetrievedChunk;
use lumen_core::{AppError, AppResult};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Citation label used when a row carries none.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Column order expected by [`normalize_row`].
pub const DEFAULT_COLUMNS: [&str; 4] = ["chunk_id", "content", "citation_label", "page_number"];

/// Fetches the top-k passages for a query.
#[derive(Clone)]
pub struct Retriever {
    service: Arc<dyn RetrievalService>,
    columns: Vec<String>,
    top_k: usize,
    timeout: Duration,
}

impl Retriever {
    pub fn new(service: Arc<dyn RetrievalService>, top_k: usize, timeout: Duration) -> Self {
        Self {
            service,
            columns: DEFAULT_COLUMNS.iter().map(|c| c.to_string()).collect(),
            top_k,
            timeout,
        }
    }

    /// Override the requested columns. Positions are looked up by name, so
    /// extra or reordered columns are fine.
    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = columns;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Retrieve up to `top_k` chunks. An empty list is a valid result.
    pub async fn retrieve(&self, query: &str) -> AppResult<Vec<RetrievedChunk>> {
        let search = self
            .service
            .similarity_search(query, &self.columns, self.top_k);

        let rows = tokio::time::timeout(self.timeout, search)
            .await
            .map_err(|_| {
                AppError::Upstream(format!(
                    "Retrieval timed out after {}s",
                    self.timeout.as_secs_f32()
                ))
            })??;

        let layout = ColumnLayout::from_columns(&self.columns);
        let chunks: Vec<RetrievedChunk> = rows
            .iter()
            .take(self.top_k)
            .map(|row| layout.normalize(row))
            .collect();

        tracing::debug!(
            service = self.service.service_name(),
            requested = self.top_k,
            returned = chunks.len(),
            "Retrieved chunks"
        );

        Ok(chunks)
    }
}

/// Positions of the known fields within a row.
#[derive(Debug, Clone, Copy)]
struct ColumnLayout {
    chunk_id: Option<usize>,
    content: Option<usize>,
    citation_label: Option<usize>,
    page_number: Option<usize>,
}

impl ColumnLayout {
    fn from_columns(columns: &[String]) -> Self {
        let position = |name: &str| columns.iter().position(|c| c == name);
        Self {
            chunk_id: position("chunk_id"),
            content: position("content"),
            citation_label: position("citation_label"),
            page_number: position("page_number"),
        }
    }

    fn normalize(&self, row: &[Value]) -> RetrievedChunk {
        let cell = |idx: Option<usize>| idx.and_then(|i| row.get(i)).and_then(cell_text);

        RetrievedChunk {
            chunk_id: cell(self.chunk_id).unwrap_or_default(),
            content: cell(self.content).unwrap_or_default(),
            citation_label: cell(self.citation_label)
                .filter(|label| !label.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
            page_number: cell(self.page_number),
        }
    }
}

/// Normalize a row laid out as [`DEFAULT_COLUMNS`].
pub fn normalize_row(row: &[Value]) -> RetrievedChunk {
    let columns: Vec<String> = DEFAULT_COLUMNS.iter().map(|c| c.to_string()).collect();
    ColumnLayout::from_columns(&columns).normalize(row)
}

fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        // Page numbers arrive as floats from some indexes
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 => Some(format!("{}", f as i64)),
            _ => Some(n.to_string()),
        },
        other => Some(other.to_string()),
    }
}
