//! SQLite-backed turn log.

use crate::persistence::{StoreSummary, TurnRecord, TurnStore};
use crate::types::SupportLevel;
use chrono::{DateTime, Utc};
use lumen_core::{AppError, AppResult};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;

/// One row per turn in a `turns` table; insertion order is the rowid.
pub struct SqliteTurnStore {
    conn: Mutex<Connection>,
}

impl SqliteTurnStore {
    /// Open (or create) the database at `db_path`.
    pub fn open(db_path: &Path) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Persistence(format!("Failed to create turn log directory: {}", e))
            })?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| AppError::Persistence(format!("Failed to open SQLite turn log: {}", e)))?;
        Self::init(conn)
    }

    /// In-memory database, for tests and throwaway engines.
    pub fn in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Persistence(format!("Failed to open SQLite turn log: {}", e)))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> AppResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS turns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                query TEXT NOT NULL,
                answer TEXT NOT NULL,
                citations TEXT NOT NULL,
                support_level TEXT NOT NULL,
                confidence REAL,
                latency_ms INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_turns_session ON turns(session_id);
            "#,
        )
        .map_err(|e| AppError::Persistence(format!("Failed to create tables: {}", e)))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn parse_support_level(raw: &str) -> AppResult<SupportLevel> {
    SupportLevel::ALL
        .into_iter()
        .find(|level| level.as_str() == raw)
        .ok_or_else(|| AppError::Serialization(format!("Unknown support level: {}", raw)))
}

fn parse_timestamp(raw: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| AppError::Serialization(format!("Invalid timestamp {}: {}", raw, e)))
}

impl TurnStore for SqliteTurnStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn append(&self, records: &[TurnRecord]) -> AppResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Persistence(format!("Failed to begin transaction: {}", e)))?;

        for record in records {
            tx.execute(
                "INSERT INTO turns (session_id, timestamp, query, answer, citations, support_level, confidence, latency_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.session_id,
                    record.timestamp.to_rfc3339(),
                    record.query,
                    record.answer,
                    serde_json::to_string(&record.citations)?,
                    record.support_level.as_str(),
                    record.confidence.map(f64::from),
                    record.latency_ms as i64,
                ],
            )
            .map_err(|e| AppError::Persistence(format!("Failed to insert turn: {}", e)))?;
        }

        tx.commit()
            .map_err(|e| AppError::Persistence(format!("Failed to commit turns: {}", e)))?;
        Ok(())
    }

    fn load_session(&self, session_id: &str) -> AppResult<Vec<TurnRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT timestamp, query, answer, citations, support_level, confidence, latency_ms
                 FROM turns WHERE session_id = ?1 ORDER BY id",
            )
            .map_err(|e| AppError::Persistence(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![session_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<f64>>(5)?,
                    row.get::<_, i64>(6)?,
                ))
            })
            .map_err(|e| AppError::Persistence(format!("Failed to query turns: {}", e)))?;

        let mut records = Vec::new();
        for row in rows {
            let (timestamp, query, answer, citations, support_level, confidence, latency_ms) =
                row.map_err(|e| AppError::Persistence(format!("Failed to read turn: {}", e)))?;
            records.push(TurnRecord {
                session_id: session_id.to_string(),
                timestamp: parse_timestamp(&timestamp)?,
                query,
                answer,
                citations: serde_json::from_str(&citations)?,
                support_level: parse_support_level(&support_level)?,
                confidence: confidence.map(|c| c as f32),
                latency_ms: latency_ms.max(0) as u64,
            });
        }
        Ok(records)
    }

    fn summary(&self) -> AppResult<StoreSummary> {
        let conn = self.conn.lock();
        let (turns, sessions): (i64, i64) = conn
            .query_row(
                "SELECT COUNT(*), COUNT(DISTINCT session_id) FROM turns",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| AppError::Persistence(format!("Failed to count turns: {}", e)))?;

        Ok(StoreSummary {
            turns: turns as usize,
            sessions: sessions as usize,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(session: &str, query: &str, level: SupportLevel, confidence: Option<f32>) -> TurnRecord {
        TurnRecord {
            session_id: session.to_string(),
            timestamp: Utc::now(),
            query: query.to_string(),
            answer: "answer".to_string(),
            citations: vec!["A".to_string(), "B".to_string(), "A".to_string()],
            support_level: level,
            confidence,
            latency_ms: 17,
        }
    }

    #[test]
    fn test_append_and_load() {
        let store = SqliteTurnStore::in_memory().unwrap();
        store
            .append(&[
                record("s1", "q1", SupportLevel::Grounded, Some(0.75)),
                record("s2", "q2", SupportLevel::Error, None),
                record("s1", "q3", SupportLevel::MemoryRecall, None),
            ])
            .unwrap();

        let s1 = store.load_session("s1").unwrap();
        assert_eq!(s1.len(), 2);
        assert_eq!(s1[0].query, "q1");
        assert_eq!(s1[0].citations, vec!["A", "B", "A"]);
        assert_eq!(s1[0].confidence, Some(0.75));
        assert_eq!(s1[1].support_level, SupportLevel::MemoryRecall);
        assert_eq!(s1[1].confidence, None);

        let summary = store.summary().unwrap();
        assert_eq!(summary.turns, 3);
        assert_eq!(summary.sessions, 2);
    }

    #[test]
    fn test_file_backed_store_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions/turns.sqlite");
        {
            let store = SqliteTurnStore::open(&path).unwrap();
            store
                .append(&[record("s1", "q1", SupportLevel::Ungrounded, Some(0.0))])
                .unwrap();
        }
        let store = SqliteTurnStore::open(&path).unwrap();
        assert_eq!(store.load_session("s1").unwrap().len(), 1);
    }

    #[test]
    fn test_parse_support_level() {
        assert_eq!(
            parse_support_level("partially_grounded").unwrap(),
            SupportLevel::PartiallyGrounded
        );
        assert!(parse_support_level("bogus").is_err());
    }
}
