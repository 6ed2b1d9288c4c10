//! `boostmdp evaluate`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use boostmdp_core::BoostConfig;
use boostmdp_rl::{QTable, Trainer, VoteTable};

#[derive(Args)]
pub struct EvaluateArgs {
    /// Vote table of the trained ensemble (JSON)
    #[arg(long)]
    pub votes: PathBuf,

    /// Saved Q-function to evaluate
    #[arg(long)]
    pub load: PathBuf,
}

pub async fn run(args: EvaluateArgs, config: BoostConfig) -> Result<()> {
    let votes = Arc::new(
        VoteTable::from_json_file(&args.votes)
            .with_context(|| format!("Failed to load votes from {}", args.votes.display()))?,
    );
    let q = QTable::load_from_file(
        &args.load,
        config.rbf.clone(),
        config.learning.learning_rate.value_at(0),
    )
    .with_context(|| format!("Failed to load Q-function from {}", args.load.display()))?;

    let trainer = Trainer::with_q_function(config, votes, q)
        .context("Q-function does not fit the configured representation")?;
    let report = trainer.evaluate()?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
