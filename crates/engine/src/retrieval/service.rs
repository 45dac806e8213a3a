//! Retrieval service abstraction.
//!
//! The passage index is an external collaborator. It is called once per
//! query and answers with positional rows matching the requested columns.

use lumen_core::AppResult;
use serde_json::Value;

/// One result row; cells follow the order of the requested columns.
pub type SearchRow = Vec<Value>;

/// Trait for similarity search backends.
///
/// Implementations may return fewer than `num_results` rows, or none.
/// Transport failures and timeouts are reported as `AppError::Upstream`.
#[async_trait::async_trait]
pub trait RetrievalService: Send + Sync {
    /// Backend name for logs.
    fn service_name(&self) -> &str;

    async fn similarity_search(
        &self,
        query_text: &str,
        columns: &[String],
        num_results: usize,
    ) -> AppResult<Vec<SearchRow>>;
}
