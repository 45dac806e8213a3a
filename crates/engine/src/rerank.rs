//! Optional reranking between retrieval and context assembly.

use crate::types::RetrievedChunk;
use lumen_core::AppResult;

/// Reorders (and may drop) retrieved chunks for a query.
#[async_trait::async_trait]
pub trait Reranker: Send + Sync {
    fn name(&self) -> &str;

    async fn rerank(&self, query: &str, chunks: Vec<RetrievedChunk>)
        -> AppResult<Vec<RetrievedChunk>>;
}

/// Keeps retrieval order as-is.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughReranker;

#[async_trait::async_trait]
impl Reranker for PassthroughReranker {
    fn name(&self) -> &str {
        "passthrough"
    }

    async fn rerank(
        &self,
        _query: &str,
        chunks: Vec<RetrievedChunk>,
    ) -> AppResult<Vec<RetrievedChunk>> {
        Ok(chunks)
    }
}
