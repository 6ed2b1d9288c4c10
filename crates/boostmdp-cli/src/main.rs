//! boostmdp CLI - Learn early-exit policies over boosted ensembles
//!
//! Trains a TD(λ) agent that decides, classifier by classifier, whether to
//! skip, apply or stop, then evaluates or inspects the learned Q-function.

// Clippy pedantic allows - these are intentional design choices
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::unused_async)]
#![allow(clippy::too_many_lines)]

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

use commands::{evaluate, inspect, train};

#[derive(Parser)]
#[command(name = "boostmdp")]
#[command(author, version, about = "boostmdp - early-exit policies for boosted ensembles", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a policy on a vote table
    Train(train::TrainArgs),

    /// Evaluate a saved Q-function with a greedy policy
    Evaluate(evaluate::EvaluateArgs),

    /// Summarize a saved Q-function
    Inspect(inspect::InspectArgs),

    /// Configuration management
    #[command(subcommand)]
    Config(commands::config::ConfigCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config errors surface when a command needs the config, after logging is up
    let loaded = config::load(cli.config.as_deref());

    let log_level = if cli.verbose {
        "debug".to_string()
    } else {
        loaded
            .as_ref()
            .map_or_else(|_| "info".to_string(), |c| c.log_level.clone())
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("boostmdp={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Train(args) => train::run(args, loaded?).await,
        Commands::Evaluate(args) => evaluate::run(args, loaded?).await,
        // Inspection only needs the RBF settings; a file without rewards is fine
        Commands::Inspect(args) => {
            let rbf = loaded.map(|c| c.rbf).unwrap_or_default();
            inspect::run(args, rbf).await
        }
        Commands::Config(cmd) => commands::config::run(cmd, cli.config.as_deref()).await,
    }
}
