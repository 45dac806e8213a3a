//! The answering pipeline.
//!
//! `ask` runs: classify → (domain questions only) retrieve → optional
//! rerank → build context → generate → extract citations → score grounding
//! → append to session → enqueue for persistence. Upstream failures become
//! `error` answers; only `NotFound` and `Busy` escape to the caller.

use crate::citations;
use crate::classifier::{chit_chat_answer, out_of_domain_answer, recall_answer, QueryClassifier};
use crate::context::build_context;
use crate::generator::{AnswerGenerator, GenerationSettings};
use crate::grounding::GroundingScorer;
use crate::persistence::{
    buffer::FlusherHandle, open_store, BufferState, FlushPolicy, PersistenceBuffer, TurnRecord,
    TurnStore,
};
use crate::rerank::{PassthroughReranker, Reranker};
use crate::retrieval::{RetrievalService, Retriever, VectorSearchClient};
use crate::session::SessionStore;
use crate::stats::{StatsSnapshot, StatsTracker};
use crate::types::{AnswerResult, Intent, QueryClassification, RetrievedChunk, Session, SupportLevel, Turn};
use lumen_core::{AppConfig, AppError, AppResult, DomainProfile, EngineSettings};
use lumen_llm::{create_client, LlmClient};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Version of the engine crate.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Builder for [`RagEngine`].
pub struct EngineBuilder {
    retrieval: Arc<dyn RetrievalService>,
    llm: Arc<dyn LlmClient>,
    settings: EngineSettings,
    domain: DomainProfile,
    model: String,
    workspace: Option<PathBuf>,
    columns: Option<Vec<String>>,
    reranker: Arc<dyn Reranker>,
    store: Option<Arc<dyn TurnStore>>,
}

impl EngineBuilder {
    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn domain(mut self, domain: DomainProfile) -> Self {
        self.domain = domain;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Workspace whose `.lumen/prompts/` may override the answer prompt.
    pub fn workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    pub fn columns(mut self, columns: Vec<String>) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = reranker;
        self
    }

    /// Durable storage for turns; ignored when persistence is disabled.
    pub fn turn_store(mut self, store: Arc<dyn TurnStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> AppResult<RagEngine> {
        self.settings.validate()?;
        let settings = self.settings;
        let timeout = Duration::from_secs(settings.request_timeout_secs);

        let stats = Arc::new(StatsTracker::new());

        let buffer = match (settings.enable_persistence, self.store) {
            (true, Some(store)) => Some(Arc::new(PersistenceBuffer::new(
                store,
                FlushPolicy::from_settings(&settings),
                Arc::clone(&stats),
            ))),
            (true, None) => {
                tracing::warn!("Persistence enabled but no turn store configured; turns stay in memory");
                None
            }
            (false, _) => None,
        };

        let mut retriever = Retriever::new(self.retrieval, settings.top_k, timeout);
        if let Some(columns) = self.columns {
            retriever = retriever.with_columns(columns);
        }

        let generator = AnswerGenerator::new(
            self.llm,
            self.workspace.as_deref(),
            self.domain.name.clone(),
            GenerationSettings {
                model: self.model,
                max_tokens: settings.max_tokens,
                temperature: settings.temperature,
                timeout,
            },
        )?;

        let sessions = Arc::new(SessionStore::new(Arc::clone(&stats), buffer.clone()));

        tracing::debug!(
            version = ENGINE_VERSION,
            provider = generator.provider_name(),
            top_k = settings.top_k,
            reranking = settings.enable_reranking,
            persistence = buffer.is_some(),
            "Built answering engine"
        );

        Ok(RagEngine {
            classifier: QueryClassifier::new(&self.domain),
            domain_name: self.domain.name,
            retriever,
            reranker: self.reranker,
            generator,
            scorer: GroundingScorer::default(),
            sessions,
            buffer,
            stats,
            settings,
            background: Mutex::new(None),
        })
    }
}

/// Background tasks owned by the engine.
struct Background {
    flusher: Option<FlusherHandle>,
    shutdown: watch::Sender<bool>,
    evictor: JoinHandle<()>,
}

/// Session-aware retrieval-augmented answering engine.
pub struct RagEngine {
    classifier: QueryClassifier,
    domain_name: String,
    retriever: Retriever,
    reranker: Arc<dyn Reranker>,
    generator: AnswerGenerator,
    scorer: GroundingScorer,
    sessions: Arc<SessionStore>,
    buffer: Option<Arc<PersistenceBuffer>>,
    stats: Arc<StatsTracker>,
    settings: EngineSettings,
    background: Mutex<Option<Background>>,
}

impl RagEngine {
    pub fn builder(retrieval: Arc<dyn RetrievalService>, llm: Arc<dyn LlmClient>) -> EngineBuilder {
        EngineBuilder {
            retrieval,
            llm,
            settings: EngineSettings::default(),
            domain: DomainProfile::default(),
            model: "llama3.2".to_string(),
            workspace: None,
            columns: None,
            reranker: Arc::new(PassthroughReranker),
            store: None,
        }
    }

    /// Wire the engine from application configuration: vector search client,
    /// generation provider and (if enabled) the turn log.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let timeout = Duration::from_secs(config.engine.request_timeout_secs);

        let host = config.retrieval.host.clone().ok_or_else(|| {
            AppError::Config(
                "Retrieval host not configured. Set retrieval.host or LUMEN_RETRIEVAL_HOST."
                    .to_string(),
            )
        })?;
        let mut search =
            VectorSearchClient::new(host, config.retrieval.index.clone()).with_timeout(timeout)?;
        match config.resolve_retrieval_token() {
            Some(token) => search = search.with_token(token),
            None => tracing::debug!(
                token_env = %config.retrieval.token_env,
                "No retrieval token in environment; querying without auth"
            ),
        }

        let endpoint = config
            .get_provider_config(&config.provider)
            .and_then(|p| p.endpoint().map(str::to_string));
        let api_key = config.resolve_api_key(&config.provider);
        let llm = create_client(&config.provider, endpoint.as_deref(), api_key.as_deref(), timeout)
            .map_err(AppError::Config)?;

        let mut builder = Self::builder(Arc::new(search), llm)
            .settings(config.engine.clone())
            .domain(config.domain.clone())
            .model(config.model.clone())
            .workspace(config.workspace.clone())
            .columns(config.retrieval.columns.clone());

        if config.engine.enable_persistence {
            let store = open_store(config.engine.persistence_backend, &config.turn_log_path())?;
            builder = builder.turn_store(store);
        }

        builder.build()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Answer `query` within `session_id`, creating the session if needed.
    ///
    /// Fails only with `Busy` when another `ask` for the same session is in
    /// flight.
    pub async fn ask(
        &self,
        query: &str,
        session_id: &str,
        use_reranking: bool,
    ) -> AppResult<AnswerResult> {
        let span = tracing::info_span!("ask", session_id = %session_id);
        self.ask_inner(query, session_id, use_reranking)
            .instrument(span)
            .await
    }

    async fn ask_inner(
        &self,
        query: &str,
        session_id: &str,
        use_reranking: bool,
    ) -> AppResult<AnswerResult> {
        let start = Instant::now();
        let guard = self.sessions.acquire_or_create(session_id)?;

        let recent = guard.recent_turns(self.settings.recall_window);
        let classification = self.classifier.classify(query, &recent);
        tracing::debug!(
            intent = classification.intent.as_str(),
            relevance = classification.domain_relevance,
            "Classified query"
        );

        let result = match classification.intent {
            Intent::MemoryRecall => AnswerResult::short_circuit(
                recall_answer(&recent),
                SupportLevel::MemoryRecall,
                classification,
                elapsed_ms(start),
            ),
            Intent::ChitChat => AnswerResult::short_circuit(
                chit_chat_answer(&self.domain_name),
                SupportLevel::OutOfDomain,
                classification,
                elapsed_ms(start),
            ),
            Intent::OutOfDomain => AnswerResult::short_circuit(
                out_of_domain_answer(&self.domain_name),
                SupportLevel::OutOfDomain,
                classification,
                elapsed_ms(start),
            ),
            Intent::DomainQuestion => {
                self.answer_domain_question(query, classification, use_reranking, start)
                    .await
            }
        };

        self.stats.record_answer(result.support_level);
        tracing::info!(
            support = %result.support_level,
            confidence = ?result.confidence(),
            citations = result.citations.len(),
            chunks = result.chunks_retrieved,
            latency_ms = result.latency_ms,
            "Answered query"
        );

        let turn = Turn::new(query, result.clone());
        let record = TurnRecord::from_turn(session_id, &turn);
        guard.append(turn);

        if let Some(buffer) = &self.buffer {
            buffer.enqueue(record).await;
        }

        Ok(result)
    }

    async fn answer_domain_question(
        &self,
        query: &str,
        classification: QueryClassification,
        use_reranking: bool,
        start: Instant,
    ) -> AnswerResult {
        let chunks = match self.retriever.retrieve(query).await {
            Ok(chunks) => chunks,
            Err(e) => return self.upstream_failure("retrieval", e, classification, Vec::new(), start),
        };

        let chunks = if self.settings.enable_reranking && use_reranking && !chunks.is_empty() {
            match self.reranker.rerank(query, chunks).await {
                Ok(reranked) => reranked,
                Err(e) => return self.upstream_failure("reranking", e, classification, Vec::new(), start),
            }
        } else {
            chunks
        };

        if chunks.is_empty() {
            tracing::info!("No chunks retrieved; skipping generation");
            return AnswerResult::no_results(classification, elapsed_ms(start));
        }

        let context = build_context(&chunks, self.settings.chunk_char_budget);
        let raw_answer = match self.generator.generate(query, &context).await {
            Ok(answer) => answer,
            Err(e) => return self.upstream_failure("generation", e, classification, chunks, start),
        };

        let citations = citations::extract(&raw_answer);
        let assessment = self.scorer.score(&raw_answer, &chunks);

        AnswerResult::generated(
            raw_answer,
            citations,
            assessment.support_level,
            assessment.confidence,
            elapsed_ms(start),
            classification,
            chunks,
            assessment.score,
        )
    }

    fn upstream_failure(
        &self,
        stage: &str,
        error: AppError,
        classification: QueryClassification,
        chunks: Vec<RetrievedChunk>,
        start: Instant,
    ) -> AnswerResult {
        tracing::error!(stage, error = %error, "Pipeline stage failed");
        AnswerResult::error(
            format!(
                "Sorry, I could not answer that right now ({} failed: {}). Please try again.",
                stage, error
            ),
            classification,
            chunks,
            elapsed_ms(start),
        )
    }

    /// Flush the session's buffered turns and remove it.
    pub async fn cleanup(&self, session_id: &str) -> AppResult<()> {
        self.sessions.cleanup(session_id).await
    }

    pub fn system_stats(&self) -> AppResult<StatsSnapshot> {
        Ok(self.stats.snapshot())
    }

    pub fn session(&self, session_id: &str) -> AppResult<Session> {
        self.sessions.get(session_id)
    }

    /// Clean up sessions idle past the configured timeout.
    pub async fn evict_idle(&self) -> usize {
        self.sessions
            .evict_idle(Duration::from_secs(self.settings.session_idle_timeout_secs))
            .await
    }

    /// Persisted turns of a session, oldest first.
    pub async fn load_session(&self, session_id: &str) -> AppResult<Vec<TurnRecord>> {
        let buffer = self
            .buffer
            .as_ref()
            .ok_or_else(|| AppError::Config("Persistence is disabled".to_string()))?;
        let store = Arc::clone(buffer.store());
        let session_id = session_id.to_string();
        tokio::task::spawn_blocking(move || store.load_session(&session_id))
            .await
            .map_err(|e| AppError::Persistence(format!("Load task failed: {}", e)))?
    }

    /// Buffer state and pending count, when persistence is on.
    pub fn persistence_status(&self) -> Option<(BufferState, usize)> {
        self.buffer
            .as_ref()
            .map(|buffer| (buffer.state(), buffer.pending_count()))
    }

    /// Start the age-based flusher and idle-session eviction on the current
    /// runtime. Calling it again is a no-op.
    pub fn start_background(&self) {
        let mut background = self.background.lock();
        if background.is_some() {
            return;
        }

        let flusher = self.buffer.as_ref().map(|buffer| buffer.spawn_flusher());

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let sessions = Arc::clone(&self.sessions);
        let idle = Duration::from_secs(self.settings.session_idle_timeout_secs);
        let evictor = tokio::spawn(async move {
            let mut interval = tokio::time::interval((idle / 2).max(Duration::from_secs(1)));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; nothing can be idle yet
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        sessions.evict_idle(idle).await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        *background = Some(Background {
            flusher,
            shutdown,
            evictor,
        });
    }

    /// Stop background tasks and flush every pending turn.
    pub async fn shutdown(&self) -> AppResult<usize> {
        let background = self.background.lock().take();
        if let Some(background) = background {
            let _ = background.shutdown.send(true);
            if let Err(e) = background.evictor.await {
                tracing::warn!(error = %e, "Session evictor ended abnormally");
            }
            if let Some(flusher) = background.flusher {
                flusher.stop().await;
            }
        }

        match &self.buffer {
            Some(buffer) => {
                let flushed = buffer.flush_all().await?;
                tracing::debug!(flushed, "Flushed pending turns on shutdown");
                Ok(flushed)
            }
            None => Ok(0),
        }
    }
}
