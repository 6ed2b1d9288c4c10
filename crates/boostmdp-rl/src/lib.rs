//! boostmdp RL - TD(λ) learning of early-exit policies over boosted ensembles
//!
//! An agent walks through a fixed ensemble of weak classifiers, one step
//! per classifier, deciding whether to skip it, apply it or stop. This
//! crate provides the episode driver and the learning machinery behind it:
//! tabular and adaptive-RBF Q-functions, per-parameter eligibility traces,
//! ε-greedy selection and offline evaluation.

// Clippy pedantic allows - these are intentional design choices
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::float_cmp)]
#![allow(clippy::similar_names)]
#![allow(clippy::module_name_repetitions)]

pub mod agent;
pub mod environment;
pub mod evaluator;
pub mod learner;
pub mod policy;
pub mod qfunction;
pub mod representation;
pub mod reward;
pub mod state;
pub mod traces;
pub mod trainer;
pub mod weak;

pub use agent::{
    Agent, AgentBuilder, Episode, EpisodeOutcome, EpisodeStats, StatsSummary, StepLogger,
    StepObserver, StepResult,
};
pub use environment::{BoostingEnvironment, Environment};
pub use evaluator::{EvaluationReport, Evaluator};
pub use learner::{LearnerStats, LearningContext, TdLearner};
pub use policy::EpsilonGreedy;
pub use qfunction::{QFunction, QTable, RbfQFunction, TabularQFunction};
pub use representation::{Observation, StateRepresentation};
pub use reward::{BoostingReward, RewardModel};
pub use state::{Action, Reward, State, Transition};
pub use traces::{EligibilityTraces, TraceEntry};
pub use trainer::{Checkpoint, Trainer, TrainingReport};
pub use weak::{VoteTable, WeakHypotheses};
