//! History command handler.
//!
//! Rebuilds a session's conversation from the persisted turn log.

use clap::Args;
use lumen_core::{config::AppConfig, AppResult};
use lumen_engine::open_store;

/// Show the persisted turns of a session
#[derive(Args, Debug)]
pub struct HistoryCommand {
    /// Session id
    pub session: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl HistoryCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing history command");

        let path = config.turn_log_path();
        if !path.exists() {
            println!("No turns have been persisted yet ({})", path.display());
            return Ok(());
        }

        let store = open_store(config.engine.persistence_backend, &path)?;
        let records = store.load_session(&self.session)?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&records)?);
            return Ok(());
        }

        if records.is_empty() {
            println!("No persisted turns for session '{}'", self.session);
            return Ok(());
        }

        println!("Session {} ({} turns)", self.session, records.len());
        for record in &records {
            println!();
            println!("[{}] Q: {}", record.timestamp.format("%Y-%m-%d %H:%M:%S"), record.query);
            println!("A: {}", record.answer);
            let confidence = record
                .confidence
                .map(|c| format!(", confidence {:.2}", c))
                .unwrap_or_default();
            println!("   ({}{}, {} ms)", record.support_level, confidence, record.latency_ms);
        }

        Ok(())
    }
}
