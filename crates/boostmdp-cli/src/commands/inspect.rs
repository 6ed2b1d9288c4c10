//! `boostmdp inspect`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use boostmdp_core::{Action, RbfConfig};
use boostmdp_rl::{QFunction, QTable};

#[derive(Args)]
pub struct InspectArgs {
    /// Saved Q-function
    #[arg(long)]
    pub load: PathBuf,
}

pub async fn run(args: InspectArgs, rbf: RbfConfig) -> Result<()> {
    let q = QTable::load_from_file(&args.load, rbf, 0.0)
        .with_context(|| format!("Failed to load Q-function from {}", args.load.display()))?;

    println!("Q-function: {}", args.load.display());
    println!("Variant: {}\n", q.variant_name());

    match &q {
        QTable::Tabular(table) => {
            println!("States: {}\n", table.num_states());
            println!(
                "{:<10} {:>10} {:>12} {:>12}",
                "ACTION", "NONZERO", "MIN", "MAX"
            );
            println!("{}", "-".repeat(47));
            for action in Action::ALL {
                let values: Vec<f64> = table.values_for(action).collect();
                let nonzero = values.iter().filter(|v| **v != 0.0).count();
                let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                println!(
                    "{:<10} {nonzero:>10} {min:>12.4} {max:>12.4}",
                    action.to_string()
                );
            }
        }
        QTable::Rbf(rbf) => {
            println!(
                "Steps: {}  Dimensions: {}  Centers: {}\n",
                rbf.num_steps(),
                rbf.dimensions(),
                rbf.total_centers()
            );
            println!(
                "{:<10} {:>6} {:>8} {:>12}",
                "ACTION", "STEP", "CENTERS", "MAX |ALPHA|"
            );
            println!("{}", "-".repeat(39));
            for action in Action::ALL {
                for step in 0..=rbf.num_steps() {
                    let list = rbf.list(step, action)?;
                    if list.is_empty() {
                        continue;
                    }
                    println!(
                        "{:<10} {step:>6} {:>8} {:>12.4}",
                        action.to_string(),
                        list.len(),
                        list.max_abs_alpha()
                    );
                }
            }
        }
    }

    println!("\nAnomalies since load: {}", q.anomalies());
    Ok(())
}
