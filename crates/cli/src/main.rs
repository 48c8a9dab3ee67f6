//! lalabot CLI — the main entry point.
//!
//! Commands:
//! - `run`      — Serve the Telegram bot
//! - `chat`     — Talk to Lala in the terminal
//! - `models`   — List the models the backend offers
//! - `onboard`  — Write a starter config
//! - `doctor`   — Diagnose configuration and backend health

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "lalabot",
    about = "Lala — a tool-augmented chat assistant backed by local models",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Telegram bot (long polling)
    Run,

    /// Chat in the terminal
    Chat,

    /// List models available on the configured backend
    Models,

    /// Write a default configuration file
    Onboard,

    /// Diagnose configuration and backend health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run => commands::run::run().await?,
        Commands::Chat => commands::chat::run().await?,
        Commands::Models => commands::models::run().await?,
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
