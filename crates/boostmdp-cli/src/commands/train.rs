//! `boostmdp train`

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};

use boostmdp_core::BoostConfig;
use boostmdp_rl::{QTable, Trainer, VoteTable};

#[derive(Args)]
pub struct TrainArgs {
    /// Vote table of the trained ensemble (JSON)
    #[arg(long)]
    pub votes: PathBuf,

    /// Number of episodes (overrides training.episodes)
    #[arg(long)]
    pub episodes: Option<u64>,

    /// Random seed (overrides training.seed)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Continue from a saved Q-function
    #[arg(long)]
    pub load: Option<PathBuf>,

    /// Where to write the learned Q-function
    #[arg(long)]
    pub save: Option<PathBuf>,

    /// Write the training report as JSON to this file instead of stdout
    #[arg(long)]
    pub report: Option<PathBuf>,
}

pub async fn run(args: TrainArgs, mut config: BoostConfig) -> Result<()> {
    if let Some(episodes) = args.episodes {
        config.training.episodes = episodes;
    }
    if let Some(seed) = args.seed {
        config.training.seed = seed;
    }
    config.validate().context("Invalid configuration")?;

    let votes = Arc::new(
        VoteTable::from_json_file(&args.votes)
            .with_context(|| format!("Failed to load votes from {}", args.votes.display()))?,
    );

    let trainer = match &args.load {
        Some(path) => {
            let q = QTable::load_from_file(
                path,
                config.rbf.clone(),
                config.learning.learning_rate.value_at(0),
            )
            .with_context(|| format!("Failed to load Q-function from {}", path.display()))?;
            Trainer::with_q_function(config, votes, q)?
        }
        None => Trainer::new(config, votes)?,
    };

    let interrupt = trainer.interrupt_handle();
    let signal = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Received Ctrl+C, stopping after the current step");
                interrupt.store(true, Ordering::SeqCst);
            }
            Err(e) => warn!("Failed to install Ctrl+C handler: {}", e),
        }
    });

    let (trainer, report) = tokio::task::spawn_blocking(move || {
        let mut trainer = trainer;
        let report = trainer.train();
        (trainer, report)
    })
    .await
    .context("Training task failed")?;
    signal.abort();
    let report = report?;

    if let Some(path) = &args.save {
        trainer
            .q_function()
            .save_to_file(path)
            .with_context(|| format!("Failed to save Q-function to {}", path.display()))?;
    }

    let json = serde_json::to_string_pretty(&report)?;
    match &args.report {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            info!("Report written to {:?}", path);
        }
        None => println!("{json}"),
    }
    Ok(())
}
