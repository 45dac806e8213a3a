//! HTTP vector search client.
//!
//! Queries a hosted index via
//! `POST {host}/api/2.0/vector-search/indexes/{index}/query` with a bearer
//! token; rows come back under `result.data_array`.

use crate::retrieval::service::{RetrievalService, SearchRow};
use lumen_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query_text: &'a str,
    columns: &'a [String],
    num_results: usize,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    result: Option<QueryResult>,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    data_array: Vec<SearchRow>,
}

/// Vector search over HTTP.
pub struct VectorSearchClient {
    host: String,
    index: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl VectorSearchClient {
    pub fn new(host: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            index: index.into(),
            token: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Bound every request by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> AppResult<Self> {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(self)
    }

    fn query_url(&self) -> String {
        format!(
            "{}/api/2.0/vector-search/indexes/{}/query",
            self.host.trim_end_matches('/'),
            self.index
        )
    }
}

fn rows_from_response(response: QueryResponse) -> Vec<SearchRow> {
    response.result.map(|r| r.data_array).unwrap_or_default()
}

#[async_trait::async_trait]
impl RetrievalService for VectorSearchClient {
    fn service_name(&self) -> &str {
        "vector-search"
    }

    async fn similarity_search(
        &self,
        query_text: &str,
        columns: &[String],
        num_results: usize,
    ) -> AppResult<Vec<SearchRow>> {
        let url = self.query_url();
        tracing::debug!(%url, num_results, "Querying vector search index");

        let mut request = self.client.post(&url).json(&QueryRequest {
            query_text,
            columns,
            num_results,
        });
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Vector search request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Upstream(format!(
                "Vector search error ({}): {}",
                status, error_text
            )));
        }

        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse vector search response: {}", e)))?;

        Ok(rows_from_response(body))
    }
}
