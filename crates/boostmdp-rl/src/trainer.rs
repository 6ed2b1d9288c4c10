//! Training loop over many episodes

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use boostmdp_core::{BoostConfig, Result, RunId, Timestamped};

use crate::agent::{Agent, EpisodeOutcome, EpisodeStats};
use crate::environment::{BoostingEnvironment, Environment};
use crate::evaluator::{EvaluationReport, Evaluator};
use crate::policy::EpsilonGreedy;
use crate::qfunction::{QFunction, QTable};
use crate::representation::StateRepresentation;
use crate::reward::BoostingReward;
use crate::weak::WeakHypotheses;

/// Evaluation taken partway through training
#[derive(Debug, Clone, Serialize)]
pub struct Checkpoint {
    pub episode: u64,
    pub evaluation: Timestamped<EvaluationReport>,
}

/// Summary of a `Trainer::train` call
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub run_id: RunId,
    /// Episodes completed in this call
    pub episodes: u64,
    pub total_steps: u64,
    pub mean_reward: f64,
    pub interrupted: bool,
    pub checkpoints: Vec<Checkpoint>,
    pub final_evaluation: Option<Timestamped<EvaluationReport>>,
    /// Rejected Q-function updates plus non-finite TD errors
    pub anomalies: u64,
    pub centers_added: u64,
    /// Total RBF centers, for the RBF variant
    pub centers: Option<usize>,
}

pub struct Trainer<W: WeakHypotheses> {
    config: BoostConfig,
    agent: Agent<BoostingEnvironment<W>, BoostingReward>,
    stats: EpisodeStats,
    evaluator: Evaluator,
    run_id: RunId,
    episodes_done: u64,
}

impl<W: WeakHypotheses> Trainer<W> {
    /// Builds a trainer with a fresh, all-zero Q-function
    pub fn new(config: BoostConfig, hypotheses: Arc<W>) -> Result<Self> {
        Self::build(config, hypotheses, None)
    }

    /// Builds a trainer that continues from a previously saved Q-function
    pub fn with_q_function(config: BoostConfig, hypotheses: Arc<W>, q: QTable) -> Result<Self> {
        Self::build(config, hypotheses, Some(q))
    }

    fn build(config: BoostConfig, hypotheses: Arc<W>, q: Option<QTable>) -> Result<Self> {
        config.validate()?;
        let environment = BoostingEnvironment::new(hypotheses)?;
        config.reward.check_classes(environment.num_classes())?;
        let representation = StateRepresentation::from_config(
            &config.representation,
            environment.num_steps(),
            environment.num_classes(),
        )?;
        let q = match q {
            Some(q) => q,
            None => QTable::from_config(&config, &representation)?,
        };
        let stats = EpisodeStats::new();
        let policy = EpsilonGreedy::new(
            config.learning.exploration.value_at(0),
            config.learning.actions.clone(),
        );

        let agent = Agent::builder(environment, BoostingReward::new(config.reward.clone()))
            .representation(representation)
            .q_function(q)
            .policy(policy)
            .learner(config.learning.clone())
            .observer(stats.clone())
            .seed(config.training.seed)
            .build()?;

        let evaluator = Evaluator::new(config.training.max_steps);
        Ok(Self {
            config,
            agent,
            stats,
            evaluator,
            run_id: RunId::new(),
            episodes_done: 0,
        })
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn agent(&self) -> &Agent<BoostingEnvironment<W>, BoostingReward> {
        &self.agent
    }

    pub fn q_function(&self) -> &QTable {
        self.agent.q_function()
    }

    pub fn into_q_function(self) -> QTable {
        self.agent.into_q_function()
    }

    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        self.agent.interrupt_handle()
    }

    pub fn evaluate(&self) -> Result<Timestamped<EvaluationReport>> {
        self.evaluator.evaluate(&self.agent)
    }

    /// Runs the configured number of episodes, or until interrupted
    pub fn train(&mut self) -> Result<TrainingReport> {
        let training = self.config.training.clone();
        let learning = self.config.learning.clone();
        let steps_before = self.agent.total_steps();
        let reward_before = self.stats.summary().total_reward;
        let mut checkpoints = Vec::new();
        let mut completed = 0u64;
        let mut interrupted = false;

        info!(
            run_id = %self.run_id,
            episodes = training.episodes,
            seed = training.seed,
            "Training started"
        );

        for _ in 0..training.episodes {
            let episode = self.episodes_done;
            self.agent
                .set_learning_rate(learning.learning_rate.value_at(episode));
            self.agent.set_epsilon(learning.exploration.value_at(episode));

            let outcome = self.agent.run_episode(training.max_steps)?;
            if let EpisodeOutcome::Interrupted { steps } = outcome {
                info!(run_id = %self.run_id, episode, steps, "Training interrupted");
                interrupted = true;
                break;
            }
            self.episodes_done += 1;
            completed += 1;

            if training.log_interval > 0 && self.episodes_done % training.log_interval == 0 {
                let summary = self.stats.summary();
                info!(
                    run_id = %self.run_id,
                    episode = self.episodes_done,
                    mean_reward = summary.mean_reward(),
                    last_reward = summary.last_episode_reward,
                    learning_rate = self.agent.q_function().learning_rate(),
                    epsilon = self.agent.policy().epsilon(),
                    "Training progress"
                );
            }
            if training.eval_interval > 0 && self.episodes_done % training.eval_interval == 0 {
                checkpoints.push(Checkpoint {
                    episode: self.episodes_done,
                    evaluation: self.evaluate()?,
                });
            }
        }

        let final_evaluation = if interrupted {
            None
        } else {
            Some(self.evaluate()?)
        };

        let summary = self.stats.summary();
        let learner = self.agent.learner_stats().cloned().unwrap_or_default();
        let total_steps = self.agent.total_steps() - steps_before;
        let report = TrainingReport {
            run_id: self.run_id,
            episodes: completed,
            total_steps,
            mean_reward: if completed > 0 {
                (summary.total_reward - reward_before) / completed as f64
            } else {
                0.0
            },
            interrupted,
            checkpoints,
            final_evaluation,
            anomalies: self.agent.q_function().anomalies() + learner.anomalies,
            centers_added: learner.centers_added,
            centers: self.agent.q_function().as_rbf().map(|rbf| rbf.total_centers()),
        };

        info!(
            run_id = %self.run_id,
            episodes = report.episodes,
            total_steps = report.total_steps,
            mean_reward = report.mean_reward,
            anomalies = report.anomalies,
            interrupted,
            "Training finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use boostmdp_core::{BoostError, RepresentationKind, RewardConfig};

    use crate::weak::VoteTable;

    fn votes() -> Arc<VoteTable> {
        let table = VoteTable::binary(
            vec![1.0, 0.8, 0.3],
            vec![0, 1, 0, 1],
            &[
                vec![1.0, -1.0, 1.0, -1.0],
                vec![1.0, -1.0, -1.0, 1.0],
                vec![-1.0, 1.0, 1.0, -1.0],
            ],
        )
        .unwrap();
        Arc::new(table)
    }

    fn config(kind: RepresentationKind) -> BoostConfig {
        let mut config = BoostConfig::with_reward(RewardConfig::new(10.0, -5.0));
        config.representation.kind = kind;
        config.training.episodes = 200;
        config.training.eval_interval = 100;
        config.training.log_interval = 50;
        config.training.seed = 9;
        config
    }

    #[test]
    fn test_training_runs_both_variants() {
        for kind in [RepresentationKind::Tabular, RepresentationKind::Rbf] {
            let mut trainer = Trainer::new(config(kind), votes()).unwrap();
            let report = trainer.train().unwrap();
            assert_eq!(report.episodes, 200);
            assert!(!report.interrupted);
            assert_eq!(report.checkpoints.len(), 2);
            assert_eq!(report.checkpoints[1].episode, 200);
            assert!(report.final_evaluation.is_some());
            assert!(report.total_steps >= 200);
            assert!(report.mean_reward.is_finite());
            assert_eq!(report.centers.is_some(), kind == RepresentationKind::Rbf);
        }
    }

    #[test]
    fn test_same_seed_same_result() {
        let run = || {
            let mut trainer = Trainer::new(config(RepresentationKind::Rbf), votes()).unwrap();
            let report = trainer.train().unwrap();
            (report.total_steps, report.mean_reward, report.centers)
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_interrupt_stops_training() {
        let mut trainer = Trainer::new(config(RepresentationKind::Tabular), votes()).unwrap();
        trainer.interrupt_handle().store(true, Ordering::SeqCst);
        let report = trainer.train().unwrap();
        assert!(report.interrupted);
        assert_eq!(report.episodes, 0);
        assert!(report.final_evaluation.is_none());
    }

    #[test]
    fn test_invalid_config_fails_before_training() {
        let mut config = config(RepresentationKind::Tabular);
        config.learning.lambda = 1.5;
        assert!(Trainer::new(config, votes()).is_err());
    }

    #[test]
    fn test_class_penalties_must_cover_every_class() {
        let mut config = config(RepresentationKind::Tabular);
        config.reward.class_penalties = Some(vec![-5.0]);
        assert!(matches!(
            Trainer::new(config.clone(), votes()),
            Err(BoostError::Config(_))
        ));

        config.reward.class_penalties = Some(vec![-5.0, -8.0]);
        assert!(Trainer::new(config, votes()).is_ok());
    }
}
