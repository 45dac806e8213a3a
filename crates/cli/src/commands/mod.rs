//! Command handlers for the Lumen CLI.
//!
//! This module organizes all CLI commands into separate submodules.

pub mod ask;
pub mod chat;
pub mod history;
pub mod stats;

// Re-export command types for convenience
pub use ask::AskCommand;
pub use chat::ChatCommand;
pub use history::HistoryCommand;
pub use stats::StatsCommand;

use lumen_core::{config::AppConfig, AppResult};
use lumen_engine::RagEngine;

/// Validate configuration and build the engine it describes.
pub(crate) fn build_engine(config: &AppConfig) -> AppResult<RagEngine> {
    config.validate()?;
    let engine = RagEngine::from_config(config)?;
    tracing::debug!(version = lumen_engine::ENGINE_VERSION, "Engine ready");
    Ok(engine)
}

/// A fresh session id for callers that did not supply one.
pub(crate) fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Flush pending turns, reporting (not failing on) persistence trouble.
pub(crate) async fn shutdown_engine(engine: &RagEngine) {
    match engine.shutdown().await {
        Ok(flushed) => tracing::debug!(flushed, "Engine shut down"),
        Err(e) => eprintln!("Warning: some turns could not be saved: {}", e),
    }
}
