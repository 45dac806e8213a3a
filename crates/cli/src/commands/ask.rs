//! Ask command handler.
//!
//! Answers one question and exits.

use super::{build_engine, new_session_id, shutdown_engine};
use clap::Args;
use lumen_core::{config::AppConfig, AppError, AppResult};
use lumen_engine::AnswerResult;
use std::path::PathBuf;

/// Ask a single question
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: Option<String>,

    /// Read the question from file
    #[arg(short, long, conflicts_with = "question")]
    pub file: Option<PathBuf>,

    /// Session to ask in (default: a new one)
    #[arg(short, long)]
    pub session: Option<String>,

    /// Rerank retrieved passages (requires engine.enableReranking)
    #[arg(long)]
    pub rerank: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    /// Execute the ask command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let question = self
            .get_question()
            .ok_or_else(|| AppError::Config("No question provided".to_string()))?;

        let engine = build_engine(config)?;
        let session_id = self.session.clone().unwrap_or_else(new_session_id);

        let outcome = engine.ask(&question, &session_id, self.rerank).await;

        // Persist whatever was answered before reporting
        shutdown_engine(&engine).await;

        let result = outcome?;
        if self.json {
            let output = serde_json::json!({
                "sessionId": session_id,
                "result": result,
            });
            let json = serde_json::to_string_pretty(&output)?;
            println!("{}", json);
        } else {
            print_answer(&result);
        }

        Ok(())
    }

    /// Get the question text from the argument or file.
    fn get_question(&self) -> Option<String> {
        self.question
            .clone()
            .or_else(|| {
                self.file.as_ref().and_then(|path| {
                    std::fs::read_to_string(path)
                        .map_err(|e| tracing::error!("Failed to read question file: {}", e))
                        .ok()
                })
            })
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
    }
}

/// Print an answer with its citations and support metadata.
pub(crate) fn print_answer(result: &AnswerResult) {
    println!("{}", result.answer);
    println!();

    if result.citations.is_empty() {
        println!("Sources: (none cited)");
    } else {
        println!("Sources:");
        let mut seen = Vec::new();
        for label in &result.citations {
            if !seen.contains(label) {
                println!("- {}", label);
                seen.push(label.clone());
            }
        }
    }

    let confidence = result
        .confidence()
        .map(|c| format!("{:.2}", c))
        .unwrap_or_else(|| "n/a".to_string());
    println!(
        "Support: {} | Confidence: {} | Chunks: {} | {} ms",
        result.support_level, confidence, result.chunks_retrieved, result.latency_ms
    );
}
