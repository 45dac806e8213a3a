//! Stats command handler.
//!
//! Shows the effective engine settings and what the turn log holds.

use clap::Args;
use lumen_core::{config::AppConfig, AppResult};
use lumen_engine::{open_store, StoreSummary};

/// Show engine settings and persisted-turn counts
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing stats command");

        let path = config.turn_log_path();
        let summary = if path.exists() {
            open_store(config.engine.persistence_backend, &path)?.summary()?
        } else {
            StoreSummary::default()
        };

        if self.json {
            let output = serde_json::json!({
                "engineVersion": lumen_engine::ENGINE_VERSION,
                "provider": config.provider,
                "model": config.model,
                "retrievalIndex": config.retrieval.index,
                "engine": config.engine,
                "turnLog": {
                    "path": path,
                    "turns": summary.turns,
                    "sessions": summary.sessions,
                },
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            return Ok(());
        }

        let engine = &config.engine;
        println!("Engine {}", lumen_engine::ENGINE_VERSION);
        println!("  Provider: {} ({})", config.provider, config.model);
        println!(
            "  Retrieval: {} @ {}",
            config.retrieval.index,
            config.retrieval.host.as_deref().unwrap_or("(host not set)")
        );
        println!("  Top-k: {}, chunk budget: {} chars", engine.top_k, engine.chunk_char_budget);
        println!(
            "  Generation: max {} tokens, temperature {}, timeout {}s",
            engine.max_tokens, engine.temperature, engine.request_timeout_secs
        );
        println!("  Reranking: {}", if engine.enable_reranking { "on" } else { "off" });
        println!(
            "  Persistence: {} ({:?}, every {} turns or {}s)",
            if engine.enable_persistence { "on" } else { "off" },
            engine.persistence_backend,
            engine.flush_every_n,
            engine.flush_every_seconds
        );
        println!("Turn log: {}", path.display());
        println!("  Turns: {}", summary.turns);
        println!("  Sessions: {}", summary.sessions);

        Ok(())
    }
}
