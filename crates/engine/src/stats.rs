//! Engine-wide operational counters.
//!
//! Purely observational: nothing here gates the pipeline.

use crate::types::SupportLevel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Point-in-time view of the counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub active_sessions: u64,

    /// Seconds since the engine was built
    pub system_uptime: u64,

    pub total_queries: u64,

    /// Answers with support level `error`
    pub total_errors: u64,

    pub persistence_failures: u64,

    pub turns_persisted: u64,

    /// Answers per support level, keyed by its wire name
    pub support_levels: BTreeMap<String, u64>,
}

/// Lock-free counters shared by the engine, session store and buffer.
#[derive(Debug)]
pub struct StatsTracker {
    started_at: Instant,
    active_sessions: AtomicU64,
    total_queries: AtomicU64,
    total_errors: AtomicU64,
    persistence_failures: AtomicU64,
    turns_persisted: AtomicU64,
    by_support_level: [AtomicU64; 6],
}

impl Default for StatsTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsTracker {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            active_sessions: AtomicU64::new(0),
            total_queries: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            persistence_failures: AtomicU64::new(0),
            turns_persisted: AtomicU64::new(0),
            by_support_level: Default::default(),
        }
    }

    /// Record one answered query.
    pub fn record_answer(&self, level: SupportLevel) {
        self.total_queries.fetch_add(1, Ordering::Relaxed);
        self.by_support_level[level.index()].fetch_add(1, Ordering::Relaxed);
        if level == SupportLevel::Error {
            self.total_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Mirror the session store's size.
    pub fn set_active_sessions(&self, count: usize) {
        self.active_sessions.store(count as u64, Ordering::Relaxed);
    }

    pub fn record_persisted(&self, turns: usize) {
        self.turns_persisted.fetch_add(turns as u64, Ordering::Relaxed);
    }

    pub fn record_persistence_failure(&self) {
        self.persistence_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let support_levels = SupportLevel::ALL
            .iter()
            .map(|level| {
                (
                    level.as_str().to_string(),
                    self.by_support_level[level.index()].load(Ordering::Relaxed),
                )
            })
            .collect();

        StatsSnapshot {
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            system_uptime: self.started_at.elapsed().as_secs(),
            total_queries: self.total_queries.load(Ordering::Relaxed),
            total_errors: self.total_errors.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
            turns_persisted: self.turns_persisted.load(Ordering::Relaxed),
            support_levels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_by_level() {
        let stats = StatsTracker::new();
        stats.record_answer(SupportLevel::Grounded);
        stats.record_answer(SupportLevel::Grounded);
        stats.record_answer(SupportLevel::Error);
        stats.record_answer(SupportLevel::OutOfDomain);

        let snap = stats.snapshot();
        assert_eq!(snap.total_queries, 4);
        assert_eq!(snap.total_errors, 1);
        assert_eq!(snap.support_levels["grounded"], 2);
        assert_eq!(snap.support_levels["out_of_domain"], 1);
        assert_eq!(snap.support_levels["memory_recall"], 0);
        assert_eq!(snap.support_levels.len(), 6);
    }

    #[test]
    fn test_persistence_counters() {
        let stats = StatsTracker::new();
        stats.record_persisted(5);
        stats.record_persisted(2);
        stats.record_persistence_failure();
        stats.set_active_sessions(3);

        let snap = stats.snapshot();
        assert_eq!(snap.turns_persisted, 7);
        assert_eq!(snap.persistence_failures, 1);
        assert_eq!(snap.active_sessions, 3);
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let json = serde_json::to_value(StatsTracker::new().snapshot()).unwrap();
        assert!(json.get("activeSessions").is_some());
        assert!(json.get("systemUptime").is_some());
        assert!(json.get("supportLevels").is_some());
    }
}
