//! In-memory session store.
//!
//! Owns every [`Session`] for its lifetime. Each session carries a gate that
//! admits one request at a time; a second concurrent request for the same id
//! is refused with `Busy` instead of queueing behind the first.

use crate::persistence::PersistenceBuffer;
use crate::stats::StatsTracker;
use crate::types::{Session, Turn};
use chrono::Utc;
use lumen_core::{AppError, AppResult};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;

struct SessionEntry {
    session: Mutex<Session>,
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl SessionEntry {
    fn new(id: &str) -> Self {
        Self {
            session: Mutex::new(Session::new(id)),
            gate: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    fn is_idle(&self, max_idle: Duration) -> bool {
        let last = self.session.lock().last_activity_at;
        (Utc::now() - last).to_std().unwrap_or(Duration::ZERO) >= max_idle
    }

    fn try_enter(self: &Arc<Self>, session_id: &str) -> AppResult<SessionGuard> {
        let permit = Arc::clone(&self.gate)
            .try_lock_owned()
            .map_err(|_| AppError::Busy(session_id.to_string()))?;
        Ok(SessionGuard {
            entry: Arc::clone(self),
            _permit: permit,
        })
    }
}

/// Exclusive access to one session for the duration of a request.
pub struct SessionGuard {
    entry: Arc<SessionEntry>,
    _permit: OwnedMutexGuard<()>,
}

impl SessionGuard {
    pub fn session_id(&self) -> String {
        self.entry.session.lock().id.clone()
    }

    /// Last `n` turns, oldest first.
    pub fn recent_turns(&self, n: usize) -> Vec<Turn> {
        let session = self.entry.session.lock();
        let start = session.turns.len().saturating_sub(n);
        session.turns[start..].to_vec()
    }

    pub fn append(&self, turn: Turn) {
        let mut session = self.entry.session.lock();
        session.last_activity_at = Utc::now();
        session.turns.push(turn);
    }
}

/// Map of live sessions keyed by caller-supplied id.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<SessionEntry>>>,
    stats: Arc<StatsTracker>,
    buffer: Option<Arc<PersistenceBuffer>>,
}

impl SessionStore {
    pub fn new(stats: Arc<StatsTracker>, buffer: Option<Arc<PersistenceBuffer>>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            stats,
            buffer,
        }
    }

    /// Create a session, or return the existing one untouched.
    pub fn create(&self, session_id: &str) -> Session {
        let entry = self.entry_or_insert(session_id);
        let session = entry.session.lock().clone();
        session
    }

    fn entry_or_insert(&self, session_id: &str) -> Arc<SessionEntry> {
        if let Some(entry) = self.sessions.read().get(session_id) {
            return Arc::clone(entry);
        }

        let mut sessions = self.sessions.write();
        let entry = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                tracing::info!(session_id, "Created session");
                Arc::new(SessionEntry::new(session_id))
            })
            .clone();
        self.stats.set_active_sessions(sessions.len());
        entry
    }

    fn entry(&self, session_id: &str) -> AppResult<Arc<SessionEntry>> {
        self.sessions
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(session_id.to_string()))
    }

    /// Snapshot of a session.
    pub fn get(&self, session_id: &str) -> AppResult<Session> {
        Ok(self.entry(session_id)?.session.lock().clone())
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().contains_key(session_id)
    }

    pub fn append(&self, session_id: &str, turn: Turn) -> AppResult<()> {
        let entry = self.entry(session_id)?;
        let mut session = entry.session.lock();
        session.last_activity_at = Utc::now();
        session.turns.push(turn);
        Ok(())
    }

    /// Last `n` turns of a session, oldest first.
    pub fn recent_turns(&self, session_id: &str, n: usize) -> AppResult<Vec<Turn>> {
        let entry = self.entry(session_id)?;
        let session = entry.session.lock();
        let start = session.turns.len().saturating_sub(n);
        Ok(session.turns[start..].to_vec())
    }

    /// Claim a session for one request.
    pub fn acquire(&self, session_id: &str) -> AppResult<SessionGuard> {
        self.entry(session_id)?.try_enter(session_id)
    }

    /// Create the session if needed, then claim it.
    pub fn acquire_or_create(&self, session_id: &str) -> AppResult<SessionGuard> {
        self.entry_or_insert(session_id).try_enter(session_id)
    }

    /// Flush the session's pending turns, then forget it.
    ///
    /// A failed flush is logged and counted; the turns stay buffered for a
    /// later flush and removal proceeds.
    pub async fn cleanup(&self, session_id: &str) -> AppResult<()> {
        let guard = self.acquire(session_id)?;
        self.remove_claimed(session_id, guard).await;
        tracing::info!(session_id, "Cleaned up session");
        Ok(())
    }

    async fn remove_claimed(&self, session_id: &str, guard: SessionGuard) {
        if let Some(buffer) = &self.buffer {
            if let Err(e) = buffer.flush_session(session_id).await {
                tracing::warn!(session_id, error = %e, "Session flush failed during cleanup");
            }
        }

        let mut sessions = self.sessions.write();
        sessions.remove(session_id);
        self.stats.set_active_sessions(sessions.len());
        drop(sessions);
        drop(guard);
    }

    /// Ids of sessions with no activity for at least `max_idle`, sorted.
    pub fn idle_sessions(&self, max_idle: Duration) -> Vec<String> {
        let mut ids: Vec<String> = self
            .sessions
            .read()
            .iter()
            .filter(|(_, entry)| entry.is_idle(max_idle))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Clean up idle sessions. Busy sessions, and sessions that saw activity
    /// after the idle scan, are skipped. Returns how many went.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut evicted = 0;
        for session_id in self.idle_sessions(max_idle) {
            let guard = match self.acquire(&session_id) {
                Ok(guard) => guard,
                Err(e) => {
                    tracing::debug!(session_id, error = %e, "Skipped idle session");
                    continue;
                }
            };
            if !guard.entry.is_idle(max_idle) {
                tracing::debug!(session_id, "Session became active, not evicting");
                continue;
            }
            self.remove_claimed(&session_id, guard).await;
            evicted += 1;
        }
        if evicted > 0 {
            tracing::info!(evicted, "Evicted idle sessions");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live session ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}
