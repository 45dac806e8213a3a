//! Chat command handler.
//!
//! Line-oriented question loop over stdin within one session.

use super::ask::print_answer;
use super::{build_engine, new_session_id, shutdown_engine};
use clap::Args;
use lumen_core::{config::AppConfig, AppError, AppResult};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Interactive question session
#[derive(Args, Debug)]
pub struct ChatCommand {
    /// Session to continue (default: a new one)
    #[arg(short, long)]
    pub session: Option<String>,

    /// Rerank retrieved passages (requires engine.enableReranking)
    #[arg(long)]
    pub rerank: bool,
}

enum Input<'a> {
    Question(&'a str),
    Stats,
    NewSession,
    Exit,
    Empty,
    Unknown(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    match line {
        "" => Input::Empty,
        "/exit" | "/quit" => Input::Exit,
        "/stats" => Input::Stats,
        "/new" => Input::NewSession,
        cmd if cmd.starts_with('/') => Input::Unknown(cmd),
        question => Input::Question(question),
    }
}

impl ChatCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing chat command");

        let engine = build_engine(config)?;
        engine.start_background();

        let mut session_id = self.session.clone().unwrap_or_else(new_session_id);
        eprintln!("Session {} (/stats, /new, /exit)", session_id);

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            eprint!("> ");
            let Some(line) = lines.next_line().await? else {
                break;
            };

            match parse_input(&line) {
                Input::Empty => continue,
                Input::Exit => break,
                Input::Stats => {
                    let stats = engine.system_stats()?;
                    println!("{}", serde_json::to_string_pretty(&stats)?);
                }
                Input::NewSession => {
                    cleanup_quietly(&engine, &session_id).await;
                    session_id = new_session_id();
                    eprintln!("Session {}", session_id);
                }
                Input::Unknown(cmd) => eprintln!("Unknown command: {}", cmd),
                Input::Question(question) => {
                    match engine.ask(question, &session_id, self.rerank).await {
                        Ok(result) => {
                            print_answer(&result);
                            println!();
                        }
                        Err(e) => eprintln!("Error: {}", e),
                    }
                }
            }
        }

        cleanup_quietly(&engine, &session_id).await;
        shutdown_engine(&engine).await;
        Ok(())
    }
}

async fn cleanup_quietly(engine: &lumen_engine::RagEngine, session_id: &str) {
    match engine.cleanup(session_id).await {
        // A session that never asked anything was never created
        Ok(()) | Err(AppError::NotFound(_)) => {}
        Err(e) => tracing::warn!(session_id, error = %e, "Session cleanup failed"),
    }
}
