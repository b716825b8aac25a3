//! statewright CLI: the main entry point.
//!
//! Commands:
//! - `chat`: Talk to the state agent (one message or interactive)
//! - `handle`: Apply a user or system message to session state
//! - `batch`: Run a JSONL file of interactions in order
//! - `config`: Show or initialize configuration
//! - `doctor`: Diagnose setup problems

use clap::{Parser, Subcommand};
use statewright_agent::HandlerRole;
use std::path::PathBuf;

mod commands;
mod runtime;

#[derive(Parser)]
#[command(
    name = "statewright",
    about = "statewright: stateful conversational orchestration",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Use this config file instead of ~/.statewright/config.toml
    #[arg(long, global = true, env = "STATEWRIGHT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the state agent
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Session whose state is loaded and persisted
        #[arg(short, long, default_value = "default")]
        session: String,
    },

    /// Apply a message to session state without generating a reply
    Handle {
        /// Who the message comes from
        #[arg(short, long, default_value = "user")]
        role: HandlerRole,

        #[arg(short, long)]
        message: String,

        #[arg(short, long, default_value = "default")]
        session: String,
    },

    /// Run interactions from a JSONL file, one `{"message": ...}` per line
    Batch {
        file: PathBuf,

        /// Record failed lines and keep going
        #[arg(long)]
        continue_on_fail: bool,

        /// Use the state handler (honours each line's `role`)
        #[arg(long)]
        handler: bool,

        #[arg(short, long, default_value = "default")]
        session: String,
    },

    /// Show configuration
    Config {
        /// Write a default config file if none exists
        #[arg(long)]
        init: bool,
    },

    /// Diagnose configuration and connectivity
    Doctor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries results.
    let filter = if cli.verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Chat { message, session } => {
            commands::chat::run(config_path, message, &session).await?
        }
        Commands::Handle { role, message, session } => {
            commands::handle::run(config_path, role, &message, &session).await?
        }
        Commands::Batch {
            file,
            continue_on_fail,
            handler,
            session,
        } => commands::batch::run(config_path, &file, continue_on_fail, handler, &session).await?,
        Commands::Config { init } => commands::config_cmd::run(config_path, init).await?,
        Commands::Doctor => commands::doctor::run(config_path).await?,
    }

    Ok(())
}
