//! Lumen CLI
//!
//! Main entry point for the lumen command-line tool.
//! Answers questions from a reference corpus with grounded, cited answers.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AskCommand, ChatCommand, HistoryCommand, StatsCommand};
use lumen_core::{config::AppConfig, logging, AppResult};
use std::path::PathBuf;

/// Lumen - grounded answers from your reference documents
#[derive(Parser, Debug)]
#[command(name = "lumen")]
#[command(about = "Grounded, cited answers from a reference corpus", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "LUMEN_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "LUMEN_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Generation provider (serving, openai, ollama)
    #[arg(short, long, global = true, env = "LUMEN_PROVIDER")]
    provider: Option<String>,

    /// Model identifier
    #[arg(short, long, global = true, env = "LUMEN_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask a single question
    Ask(AskCommand),

    /// Interactive question session
    Chat(ChatCommand),

    /// Show the persisted turns of a session
    History(HistoryCommand),

    /// Show engine settings and persisted-turn counts
    Stats(StatsCommand),
}

/// Load configuration, letting workspace and config file flags pick the
/// file that is merged.
fn load_config(cli: &Cli) -> AppResult<AppConfig> {
    AppConfig::load_with(cli.workspace.clone(), cli.config.clone())
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    let config = load_config(&cli)?;

    // Apply CLI overrides
    let config = config.with_overrides(
        cli.workspace,
        cli.config,
        cli.provider,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    // Initialize logging with final configuration
    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    tracing::info!("Lumen CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {}", config.provider);
    tracing::debug!("Model: {}", config.model);

    config.ensure_lumen_dir()?;

    let command_name = match &cli.command {
        Commands::Ask(_) => "ask",
        Commands::Chat(_) => "chat",
        Commands::History(_) => "history",
        Commands::Stats(_) => "stats",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Chat(cmd) => cmd.execute(&config).await,
        Commands::History(cmd) => cmd.execute(&config).await,
        Commands::Stats(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
