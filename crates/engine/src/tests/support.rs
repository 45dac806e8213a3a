//! Mock collaborators and engine fixtures.

use crate::persistence::{StoreSummary, TurnRecord, TurnStore};
use crate::rerank::Reranker;
use crate::retrieval::{RetrievalService, SearchRow};
use crate::types::RetrievedChunk;
use crate::RagEngine;
use lumen_core::{AppError, AppResult, EngineSettings};
use lumen_llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Retrieval service returning fixed rows and counting calls.
#[derive(Default)]
pub struct CountingRetrieval {
    pub rows: Mutex<Vec<SearchRow>>,
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl CountingRetrieval {
    pub fn with_rows(rows: Vec<SearchRow>) -> Arc<Self> {
        Arc::new(Self {
            rows: Mutex::new(rows),
            ..Default::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RetrievalService for CountingRetrieval {
    fn service_name(&self) -> &str {
        "counting"
    }

    async fn similarity_search(
        &self,
        _query_text: &str,
        _columns: &[String],
        _num_results: usize,
    ) -> AppResult<Vec<SearchRow>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Upstream("index unavailable".to_string()));
        }
        Ok(self.rows.lock().clone())
    }
}

/// Generation client returning a fixed answer and recording prompts.
pub struct CountingLlm {
    pub answer: Mutex<String>,
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
    pub delay: Duration,
    pub last_request: Mutex<Option<LlmRequest>>,
}

impl CountingLlm {
    pub fn answering(answer: &str) -> Arc<Self> {
        Self::slow(answer, Duration::ZERO)
    }

    pub fn slow(answer: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            answer: Mutex::new(answer.to_string()),
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            delay,
            last_request: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> String {
        self.last_request
            .lock()
            .as_ref()
            .map(|r| r.prompt.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl LlmClient for CountingLlm {
    fn provider_name(&self) -> &str {
        "counting"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock() = Some(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Upstream("serving endpoint returned 503".to_string()));
        }
        Ok(LlmResponse {
            content: self.answer.lock().clone(),
            model: request.model.clone(),
            usage: LlmUsage::new(120, 40),
        })
    }
}

/// Reverses chunk order so its effect is visible.
#[derive(Default)]
pub struct ReversingReranker {
    pub calls: AtomicUsize,
}

#[async_trait::async_trait]
impl Reranker for ReversingReranker {
    fn name(&self) -> &str {
        "reversing"
    }

    async fn rerank(
        &self,
        _query: &str,
        mut chunks: Vec<RetrievedChunk>,
    ) -> AppResult<Vec<RetrievedChunk>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        chunks.reverse();
        Ok(chunks)
    }
}

/// Turn store whose writes can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    pub records: Mutex<Vec<TurnRecord>>,
    pub fail: AtomicBool,
}

impl TurnStore for FlakyStore {
    fn name(&self) -> &str {
        "flaky"
    }

    fn append(&self, records: &[TurnRecord]) -> AppResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Persistence("read-only filesystem".to_string()));
        }
        self.records.lock().extend_from_slice(records);
        Ok(())
    }

    fn load_session(&self, session_id: &str) -> AppResult<Vec<TurnRecord>> {
        Ok(self
            .records
            .lock()
            .iter()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect())
    }

    fn summary(&self) -> AppResult<StoreSummary> {
        Ok(StoreSummary {
            turns: self.records.lock().len(),
            sessions: 0,
        })
    }
}

/// Three passages about edge detection.
pub fn edge_rows() -> Vec<SearchRow> {
    vec![
        vec![
            json!("gw-10-1"),
            json!("Edge detection identifies points in a digital image where brightness changes sharply. Edges mark boundaries between regions."),
            json!("Gonzalez & Woods"),
            json!(700),
        ],
        vec![
            json!("sz-7-2"),
            json!("Gradient operators such as Sobel estimate intensity derivatives; edge detection thresholds the gradient magnitude."),
            json!("Szeliski"),
            json!(213.0),
        ],
        vec![
            json!("fp-5-4"),
            json!("The Canny edge detector smooths the image, computes gradients, applies non-maximum suppression and hysteresis thresholds."),
            json!("Forsyth & Ponce"),
            serde_json::Value::Null,
        ],
    ]
}

/// An answer fully supported by [`edge_rows`], citing two sources.
pub const EDGE_ANSWER: &str = "Edge detection identifies points in an image where brightness changes sharply [Source: Gonzalez & Woods]. \
Sobel operators estimate the gradient magnitude, which is then thresholded [Source: Szeliski].";

/// Settings with persistence off unless a test turns it on.
pub fn settings() -> EngineSettings {
    EngineSettings {
        enable_persistence: false,
        ..EngineSettings::default()
    }
}

pub fn engine(retrieval: Arc<CountingRetrieval>, llm: Arc<CountingLlm>) -> RagEngine {
    RagEngine::builder(retrieval, llm)
        .settings(settings())
        .build()
        .unwrap()
}

pub fn engine_with_store(
    retrieval: Arc<CountingRetrieval>,
    llm: Arc<CountingLlm>,
    store: Arc<dyn TurnStore>,
    flush_every_n: usize,
) -> RagEngine {
    RagEngine::builder(retrieval, llm)
        .settings(EngineSettings {
            enable_persistence: true,
            flush_every_n,
            ..EngineSettings::default()
        })
        .turn_store(store)
        .build()
        .unwrap()
}
