//! Batched writes of completed turns.
//!
//! Turns are queued in memory and written to the [`TurnStore`] when the
//! pending count reaches `every_n`, when the oldest pending turn is older
//! than `max_age`, on session cleanup, and on shutdown. Flushes are
//! serialized; a failed flush puts the batch back in its original order.

use crate::persistence::{TurnRecord, TurnStore};
use crate::stats::StatsTracker;
use lumen_core::{AppError, AppResult, EngineSettings};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Lifecycle of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferState {
    /// Nothing pending
    Idle,
    /// Turns pending, no write in progress
    Buffering,
    /// A write is in progress
    Flushing,
}

/// When to flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    pub every_n: usize,
    pub max_age: Duration,
}

impl FlushPolicy {
    pub fn new(every_n: usize, max_age: Duration) -> Self {
        Self {
            every_n: every_n.max(1),
            max_age,
        }
    }

    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self::new(
            settings.flush_every_n,
            Duration::from_secs(settings.flush_every_seconds),
        )
    }

    /// How often the background flusher checks the oldest turn's age.
    fn tick(&self) -> Duration {
        (self.max_age / 4).clamp(Duration::from_millis(10), Duration::from_secs(1))
    }
}

#[derive(Debug)]
struct Pending {
    seq: u64,
    enqueued_at: Instant,
    record: TurnRecord,
}

#[derive(Debug)]
struct Inner {
    queue: VecDeque<Pending>,
    state: BufferState,
    next_seq: u64,
}

impl Inner {
    fn settle(&mut self) {
        self.state = if self.queue.is_empty() {
            BufferState::Idle
        } else {
            BufferState::Buffering
        };
    }

    /// Put a failed batch back, keeping enqueue order.
    fn restore(&mut self, batch: Vec<Pending>) {
        self.queue.extend(batch);
        self.queue.make_contiguous().sort_by_key(|p| p.seq);
    }
}

/// Queue of turns awaiting durable storage.
pub struct PersistenceBuffer {
    store: Arc<dyn TurnStore>,
    policy: FlushPolicy,
    stats: Arc<StatsTracker>,
    inner: Mutex<Inner>,
    flush_lock: tokio::sync::Mutex<()>,
}

impl PersistenceBuffer {
    pub fn new(store: Arc<dyn TurnStore>, policy: FlushPolicy, stats: Arc<StatsTracker>) -> Self {
        Self {
            store,
            policy,
            stats,
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                state: BufferState::Idle,
                next_seq: 0,
            }),
            flush_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn policy(&self) -> FlushPolicy {
        self.policy
    }

    pub fn store(&self) -> &Arc<dyn TurnStore> {
        &self.store
    }

    pub fn state(&self) -> BufferState {
        self.inner.lock().state
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn pending_for(&self, session_id: &str) -> usize {
        self.inner
            .lock()
            .queue
            .iter()
            .filter(|p| p.record.session_id == session_id)
            .count()
    }

    /// Queue a record; flushes inline once `every_n` turns are pending.
    ///
    /// Never fails: a failed flush keeps the turns and is counted in stats.
    pub async fn enqueue(&self, record: TurnRecord) {
        let reached = {
            let mut inner = self.inner.lock();
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.queue.push_back(Pending {
                seq,
                enqueued_at: Instant::now(),
                record,
            });
            if inner.state == BufferState::Idle {
                inner.state = BufferState::Buffering;
            }
            inner.queue.len() >= self.policy.every_n
        };

        if reached {
            let _ = self.flush().await;
        }
    }

    /// Write everything pending. Returns the number of turns written.
    pub async fn flush(&self) -> AppResult<usize> {
        self.flush_where(|_| true).await
    }

    /// Write pending turns of one session, leaving others queued.
    pub async fn flush_session(&self, session_id: &str) -> AppResult<usize> {
        self.flush_where(|record| record.session_id == session_id)
            .await
    }

    /// Flush if the oldest pending turn has reached the age limit.
    pub async fn flush_due(&self) -> AppResult<usize> {
        let due = {
            let inner = self.inner.lock();
            inner
                .queue
                .front()
                .map(|p| p.enqueued_at.elapsed() >= self.policy.max_age)
                .unwrap_or(false)
        };
        if due {
            tracing::debug!("Oldest pending turn reached flush age");
            self.flush().await
        } else {
            Ok(0)
        }
    }

    /// Final flush on shutdown.
    pub async fn flush_all(&self) -> AppResult<usize> {
        self.flush().await
    }

    async fn flush_where<F>(&self, select: F) -> AppResult<usize>
    where
        F: Fn(&TurnRecord) -> bool,
    {
        let _flushing = self.flush_lock.lock().await;

        let batch: Vec<Pending> = {
            let mut inner = self.inner.lock();
            let (selected, kept): (Vec<Pending>, Vec<Pending>) =
                inner.queue.drain(..).partition(|p| select(&p.record));
            inner.queue = kept.into();
            if selected.is_empty() {
                inner.settle();
                return Ok(0);
            }
            inner.state = BufferState::Flushing;
            selected
        };

        let records: Vec<TurnRecord> = batch.iter().map(|p| p.record.clone()).collect();
        let count = records.len();
        let store = Arc::clone(&self.store);

        let result = tokio::task::spawn_blocking(move || store.append(&records))
            .await
            .map_err(|e| AppError::Persistence(format!("Flush task failed: {}", e)))
            .and_then(|r| r);

        let mut inner = self.inner.lock();
        match result {
            Ok(()) => {
                inner.settle();
                drop(inner);
                self.stats.record_persisted(count);
                tracing::debug!(turns = count, store = self.store.name(), "Flushed turns");
                Ok(count)
            }
            Err(e) => {
                inner.restore(batch);
                inner.state = BufferState::Buffering;
                drop(inner);
                self.stats.record_persistence_failure();
                tracing::warn!(turns = count, error = %e, "Failed to persist turns; keeping them buffered");
                Err(match e {
                    AppError::Persistence(_) => e,
                    other => AppError::Persistence(other.to_string()),
                })
            }
        }
    }

    /// Start the age-based flusher on the current runtime.
    pub fn spawn_flusher(self: &Arc<Self>) -> FlusherHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let buffer = Arc::clone(self);
        let tick = self.policy.tick();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        // Failures are logged and counted inside flush
                        let _ = buffer.flush_due().await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Persistence flusher stopped");
        });

        FlusherHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Handle to the background flusher task.
pub struct FlusherHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl FlusherHandle {
    /// Stop the task and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Persistence flusher task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::StoreSummary;
    use crate::types::SupportLevel;
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct MemoryStore {
        records: parking_lot::Mutex<Vec<TurnRecord>>,
        fail: AtomicBool,
    }

    impl TurnStore for MemoryStore {
        fn name(&self) -> &str {
            "memory"
        }

        fn append(&self, records: &[TurnRecord]) -> AppResult<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(AppError::Persistence("disk full".to_string()));
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

    fn record(session: &str, query: &str) -> TurnRecord {
        TurnRecord {
            session_id: session.to_string(),
            timestamp: Utc::now(),
            query: query.to_string(),
            answer: "a".to_string(),
            citations: Vec::new(),
            support_level: SupportLevel::Ungrounded,
            confidence: Some(0.0),
            latency_ms: 1,
        }
    }

    fn buffer(every_n: usize, max_age: Duration) -> (Arc<PersistenceBuffer>, Arc<MemoryStore>, Arc<StatsTracker>) {
        let store = Arc::new(MemoryStore::default());
        let stats = Arc::new(StatsTracker::new());
        let buffer = Arc::new(PersistenceBuffer::new(
            store.clone(),
            FlushPolicy::new(every_n, max_age),
            stats.clone(),
        ));
        (buffer, store, stats)
    }

    #[tokio::test]
    async fn test_flushes_at_exactly_every_n() {
        let (buffer, store, stats) = buffer(3, Duration::from_secs(3600));

        buffer.enqueue(record("s1", "q1")).await;
        buffer.enqueue(record("s1", "q2")).await;
        assert_eq!(store.records.lock().len(), 0);
        assert_eq!(buffer.state(), BufferState::Buffering);

        buffer.enqueue(record("s1", "q3")).await;
        assert_eq!(store.records.lock().len(), 3);
        assert_eq!(buffer.pending_count(), 0);
        assert_eq!(buffer.state(), BufferState::Idle);
        assert_eq!(stats.snapshot().turns_persisted, 3);
    }

    #[tokio::test]
    async fn test_flush_due_respects_age() {
        let (buffer, store, _) = buffer(10, Duration::from_millis(50));
        buffer.enqueue(record("s1", "q1")).await;

        assert_eq!(buffer.flush_due().await.unwrap(), 0);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(buffer.flush_due().await.unwrap(), 1);
        assert_eq!(store.records.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_background_flusher_writes_old_turns() {
        let (buffer, store, _) = buffer(10, Duration::from_millis(40));
        let flusher = buffer.spawn_flusher();

        buffer.enqueue(record("s1", "q1")).await;
        buffer.enqueue(record("s1", "q2")).await;
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(store.records.lock().len(), 2);
        assert_eq!(buffer.pending_count(), 0);
        flusher.stop().await;
    }

    #[tokio::test]
    async fn test_failed_flush_retains_turns_in_order() {
        let (buffer, store, stats) = buffer(2, Duration::from_secs(3600));
        store.fail.store(true, Ordering::SeqCst);

        buffer.enqueue(record("s1", "q1")).await;
        buffer.enqueue(record("s1", "q2")).await;
        assert_eq!(buffer.pending_count(), 2);
        assert_eq!(buffer.state(), BufferState::Buffering);
        assert_eq!(stats.snapshot().persistence_failures, 1);

        store.fail.store(false, Ordering::SeqCst);
        assert_eq!(buffer.flush_all().await.unwrap(), 2);
        let written = store.records.lock();
        assert_eq!(written[0].query, "q1");
        assert_eq!(written[1].query, "q2");
    }

    #[tokio::test]
    async fn test_flush_session_leaves_others() {
        let (buffer, store, _) = buffer(10, Duration::from_secs(3600));
        buffer.enqueue(record("s1", "q1")).await;
        buffer.enqueue(record("s2", "q2")).await;
        buffer.enqueue(record("s1", "q3")).await;

        assert_eq!(buffer.flush_session("s1").await.unwrap(), 2);
        assert_eq!(buffer.pending_for("s1"), 0);
        assert_eq!(buffer.pending_for("s2"), 1);
        assert_eq!(store.load_session("s1").unwrap().len(), 2);
        assert_eq!(buffer.state(), BufferState::Buffering);
    }

    #[tokio::test]
    async fn test_failed_session_flush_restores_interleaving() {
        let (buffer, store, _) = buffer(10, Duration::from_secs(3600));
        buffer.enqueue(record("s1", "q1")).await;
        buffer.enqueue(record("s2", "q2")).await;
        buffer.enqueue(record("s1", "q3")).await;

        store.fail.store(true, Ordering::SeqCst);
        assert!(buffer.flush_session("s1").await.is_err());
        store.fail.store(false, Ordering::SeqCst);

        buffer.flush_all().await.unwrap();
        let queries: Vec<String> = store.records.lock().iter().map(|r| r.query.clone()).collect();
        assert_eq!(queries, vec!["q1", "q2", "q3"]);
    }

    #[test]
    fn test_policy_clamps() {
        assert_eq!(FlushPolicy::new(0, Duration::from_secs(1)).every_n, 1);
        assert_eq!(FlushPolicy::new(5, Duration::from_secs(30)).tick(), Duration::from_secs(1));
        assert_eq!(FlushPolicy::new(5, Duration::from_millis(8)).tick(), Duration::from_millis(10));
    }
}
