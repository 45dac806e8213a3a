//! JSON-lines turn log.

use crate::persistence::{StoreSummary, TurnRecord, TurnStore};
use lumen_core::{AppError, AppResult};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Appends one JSON object per line to a single file.
pub struct JsonlTurnStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlTurnStore {
    pub fn new(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> AppResult<Vec<TurnRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = OpenOptions::new().read(true).open(&self.path)?;
        let reader = BufReader::new(file);

        let mut records = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TurnRecord>(&line) {
                Ok(record) => records.push(record),
                // A torn final line after a crash should not hide the rest
                Err(e) => tracing::warn!(line = line_no + 1, error = %e, "Skipping unreadable turn record"),
            }
        }
        Ok(records)
    }
}

fn ends_with_newline(file: &mut File, len: u64) -> AppResult<bool> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

impl TurnStore for JsonlTurnStore {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn append(&self, records: &[TurnRecord]) -> AppResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        // Serialize the whole batch first so a bad record writes nothing
        let mut batch = String::new();
        for record in records {
            batch.push_str(&serde_json::to_string(record)?);
            batch.push('\n');
        }

        let _guard = self.write_lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| AppError::Persistence(format!("Failed to open {:?}: {}", self.path, e)))?;

        let start = file.metadata()?.len();
        if start > 0 && !ends_with_newline(&mut file, start)? {
            // Terminate a torn tail so the next record starts on its own line
            batch.insert(0, '\n');
        }

        if let Err(e) = file.write_all(batch.as_bytes()).and_then(|_| file.flush()) {
            if let Err(trunc) = file.set_len(start) {
                tracing::warn!(path = %self.path.display(), error = %trunc, "Failed to roll back partial write");
            }
            return Err(AppError::Persistence(format!(
                "Failed to write {:?}: {}",
                self.path, e
            )));
        }
        Ok(())
    }

    fn load_session(&self, session_id: &str) -> AppResult<Vec<TurnRecord>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|r| r.session_id == session_id)
            .collect())
    }

    fn summary(&self) -> AppResult<StoreSummary> {
        let records = self.read_all()?;
        let sessions: HashSet<&str> = records.iter().map(|r| r.session_id.as_str()).collect();
        Ok(StoreSummary {
            turns: records.len(),
            sessions: sessions.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SupportLevel;
    use chrono::Utc;

    fn record(session: &str, query: &str) -> TurnRecord {
        TurnRecord {
            session_id: session.to_string(),
            timestamp: Utc::now(),
            query: query.to_string(),
            answer: "Edges are gradients [Source: A].".to_string(),
            citations: vec!["A".to_string()],
            support_level: SupportLevel::Grounded,
            confidence: Some(0.8),
            latency_ms: 42,
        }
    }

    #[test]
    fn test_append_and_load_by_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlTurnStore::new(dir.path().join("sessions/turns.jsonl")).unwrap();

        store
            .append(&[record("s1", "q1"), record("s2", "q2"), record("s1", "q3")])
            .unwrap();

        let s1 = store.load_session("s1").unwrap();
        assert_eq!(s1.len(), 2);
        assert_eq!(s1[0].query, "q1");
        assert_eq!(s1[1].query, "q3");
        assert!(store.load_session("nope").unwrap().is_empty());

        let summary = store.summary().unwrap();
        assert_eq!(summary.turns, 3);
        assert_eq!(summary.sessions, 2);
    }

    #[test]
    fn test_appends_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("turns.jsonl");
        let store = JsonlTurnStore::new(&path).unwrap();
        store.append(&[record("s1", "q1")]).unwrap();
        store.append(&[record("s1", "q2")]).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert_eq!(store.load_session("s1").unwrap()[1].query, "q2");
    }

    #[test]
    fn test_torn_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("turns.jsonl");
        let store = JsonlTurnStore::new(&path).unwrap();
        store.append(&[record("s1", "q1")]).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        write!(file, "{{\"sessionId\":\"s1\",\"tim").unwrap();

        assert_eq!(store.load_session("s1").unwrap().len(), 1);
    }

    #[test]
    fn test_append_after_torn_line_keeps_every_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("turns.jsonl");
        let store = JsonlTurnStore::new(&path).unwrap();
        store.append(&[record("s1", "q1")]).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        write!(file, "{{\"sessionId\":\"s1\",\"tim").unwrap();
        drop(file);

        store.append(&[record("s1", "q2"), record("s1", "q3")]).unwrap();

        let queries: Vec<String> = store
            .load_session("s1")
            .unwrap()
            .into_iter()
            .map(|r| r.query)
            .collect();
        assert_eq!(queries, vec!["q1", "q2", "q3"]);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlTurnStore::new(dir.path().join("turns.jsonl")).unwrap();
        assert_eq!(store.summary().unwrap(), StoreSummary::default());
    }
}
