//! Offline evaluation with a frozen greedy policy

use serde::Serialize;
use tracing::info;

use boostmdp_core::{Result, Timestamped};

use crate::agent::{Agent, EpisodeOutcome};
use crate::environment::Environment;
use crate::reward::RewardModel;

/// Aggregate statistics of one pass over every instance
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub episodes: usize,
    /// Share of instances whose final margin predicts the label
    pub accuracy: f64,
    pub mean_reward: f64,
    /// Mean number of classifiers evaluated before stopping
    pub mean_classifiers: f64,
    pub mean_steps: f64,
    /// Episodes cut off by the step limit
    pub truncated: usize,
}

/// Rolls out each instance once without learning or exploration
#[derive(Debug, Clone, Copy)]
pub struct Evaluator {
    max_steps: usize,
}

impl Evaluator {
    pub fn new(max_steps: usize) -> Self {
        Self { max_steps }
    }

    /// Evaluates a greedy copy of `agent`; the agent itself is untouched
    pub fn evaluate<E, R>(&self, agent: &Agent<E, R>) -> Result<Timestamped<EvaluationReport>>
    where
        E: Environment + Clone,
        R: RewardModel + Clone,
    {
        let mut frozen = agent.frozen_copy();
        let instances = frozen.environment().num_instances();

        let mut report = EvaluationReport::default();
        let mut correct = 0usize;
        let mut reward = 0.0;
        let mut classifiers = 0usize;
        let mut steps = 0usize;

        for instance in 0..instances {
            frozen.start_episode_at(instance)?;
            let outcome = frozen.run_episode(self.max_steps)?;
            if matches!(outcome, EpisodeOutcome::StepLimit { .. }) {
                report.truncated += 1;
            }
            if let Some(episode) = frozen.episode() {
                let state = episode.state();
                correct += usize::from(state.is_correct());
                classifiers += state.applied;
                reward += episode.total_reward();
                steps += episode.steps();
            }
        }

        if instances > 0 {
            let n = instances as f64;
            report.episodes = instances;
            report.accuracy = correct as f64 / n;
            report.mean_reward = reward / n;
            report.mean_classifiers = classifiers as f64 / n;
            report.mean_steps = steps as f64 / n;
        }

        info!(
            episodes = report.episodes,
            accuracy = report.accuracy,
            mean_reward = report.mean_reward,
            mean_classifiers = report.mean_classifiers,
            "Evaluation complete"
        );
        Ok(Timestamped::new(report))
    }
}
