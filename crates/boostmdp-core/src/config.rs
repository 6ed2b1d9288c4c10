//! Configuration tree for a learning run
//!
//! Every section except `reward` falls back to defaults; the reward values
//! that decide what "success" is worth have no sensible default and must be
//! supplied. `BoostConfig::validate` is called before any episode runs.

use serde::{Deserialize, Serialize};

use crate::action::ActionSet;
use crate::error::{BoostError, Result};

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub learning: LearningConfig,
    #[serde(default)]
    pub rbf: RbfConfig,
    pub reward: RewardConfig,
    #[serde(default)]
    pub representation: RepresentationConfig,
    #[serde(default)]
    pub training: TrainingConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl BoostConfig {
    /// Builds a configuration with default sections around the given reward model
    pub fn with_reward(reward: RewardConfig) -> Self {
        Self {
            log_level: default_log_level(),
            learning: LearningConfig::default(),
            rbf: RbfConfig::default(),
            reward,
            representation: RepresentationConfig::default(),
            training: TrainingConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.learning.validate()?;
        self.rbf.validate()?;
        self.reward.validate()?;
        self.representation.validate()?;
        self.training.validate()?;
        Ok(())
    }
}

/// Hyperbolic schedule `numerator / (divisor + increment * episode)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub numerator: f64,
    pub divisor: f64,
    #[serde(default)]
    pub increment: f64,
}

impl Schedule {
    pub const fn constant(value: f64) -> Self {
        Self {
            numerator: value,
            divisor: 1.0,
            increment: 0.0,
        }
    }

    pub fn value_at(&self, episode: u64) -> f64 {
        self.numerator / (self.divisor + self.increment * episode as f64)
    }

    fn validate(&self, name: &str) -> Result<()> {
        if !(self.divisor > 0.0) || self.increment < 0.0 || self.numerator < 0.0 {
            return Err(BoostError::config(format!(
                "{name} schedule needs numerator >= 0, divisor > 0, increment >= 0"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Eligibility decay
    pub lambda: f64,
    /// Discount factor
    pub gamma: f64,
    /// Replace (rather than accumulate) a trace when its pair is revisited
    pub replacing_traces: bool,
    /// Prune trace entries whose largest component falls below this value.
    /// Unset by default; enabling it changes learning behaviour.
    pub trace_threshold: Option<f64>,
    pub learning_rate: Schedule,
    pub exploration: Schedule,
    pub actions: ActionSet,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            lambda: 0.95,
            gamma: 1.0,
            replacing_traces: false,
            trace_threshold: None,
            learning_rate: Schedule::constant(0.2),
            exploration: Schedule::constant(0.1),
            actions: ActionSet::default(),
        }
    }
}

impl LearningConfig {
    fn validate(&self) -> Result<()> {
        check_unit("learning.lambda", self.lambda)?;
        check_unit("learning.gamma", self.gamma)?;
        if let Some(threshold) = self.trace_threshold {
            if !(threshold >= 0.0) {
                return Err(BoostError::config(
                    "learning.trace_threshold must be non-negative",
                ));
            }
        }
        self.learning_rate.validate("learning.learning_rate")?;
        self.exploration.validate("learning.exploration")?;
        self.actions.validate()
    }
}

/// Growth and update parameters of the adaptive RBF Q-function
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RbfConfig {
    /// Grow a center when the summed activation at the visited margin is below this
    pub min_activation: f64,
    /// Grow a center when |td| exceeds max|alpha| divided by this
    pub max_td_error_divisor: f64,
    /// Width used while a list holds few centers, and as the fallback
    pub initial_sigma: f64,
    /// Largest width the neighbour rule may derive
    pub max_sigma: f64,
    /// Growth is refused once a list holds this many centers
    pub max_centers: usize,
    /// Divide the mixture by the summed activation
    pub normalized: bool,
    pub alpha_rate: f64,
    pub mean_rate: f64,
    pub sigma_rate: f64,
}

impl Default for RbfConfig {
    fn default() -> Self {
        Self {
            min_activation: 0.4,
            max_td_error_divisor: 5.0,
            initial_sigma: 0.01,
            max_sigma: 0.1,
            max_centers: 100,
            normalized: false,
            alpha_rate: 1.0,
            mean_rate: 0.0,
            sigma_rate: 0.0,
        }
    }
}

impl RbfConfig {
    fn validate(&self) -> Result<()> {
        check_unit("rbf.min_activation", self.min_activation)?;
        if !(self.max_td_error_divisor > 0.0) {
            return Err(BoostError::config("rbf.max_td_error_divisor must be positive"));
        }
        if !(self.initial_sigma > 0.0) {
            return Err(BoostError::config("rbf.initial_sigma must be positive"));
        }
        if !(self.max_sigma >= self.initial_sigma) {
            return Err(BoostError::config(
                "rbf.max_sigma must be at least rbf.initial_sigma",
            ));
        }
        if self.max_centers == 0 {
            return Err(BoostError::config("rbf.max_centers must be positive"));
        }
        for (name, rate) in [
            ("rbf.alpha_rate", self.alpha_rate),
            ("rbf.mean_rate", self.mean_rate),
            ("rbf.sigma_rate", self.sigma_rate),
        ] {
            if !(rate >= 0.0) {
                return Err(BoostError::config(format!("{name} must be non-negative")));
            }
        }
        Ok(())
    }
}

/// How a finished episode is scored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardMode {
    /// Fixed reward for a correct prediction, penalty otherwise
    #[default]
    Hamming,
    /// Inverse of the accumulated exponential loss
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardConfig {
    #[serde(default)]
    pub mode: RewardMode,
    /// Hand out the terminal signal as it accrues, at every classify step
    #[serde(default)]
    pub incremental: bool,
    #[serde(default)]
    pub skip_cost: f64,
    #[serde(default = "default_classify_cost")]
    pub classify_cost: f64,
    #[serde(default)]
    pub terminate_cost: f64,
    pub success_reward: f64,
    pub fail_penalty: f64,
    /// Per-label penalty overriding `fail_penalty`
    #[serde(default)]
    pub class_penalties: Option<Vec<f64>>,
}

fn default_classify_cost() -> f64 {
    -1.0
}

impl RewardConfig {
    pub fn new(success_reward: f64, fail_penalty: f64) -> Self {
        Self {
            mode: RewardMode::Hamming,
            incremental: false,
            skip_cost: 0.0,
            classify_cost: default_classify_cost(),
            terminate_cost: 0.0,
            success_reward,
            fail_penalty,
            class_penalties: None,
        }
    }

    /// Penalty for misclassifying an example whose label is `label`
    pub fn penalty_for(&self, label: usize) -> f64 {
        self.class_penalties
            .as_ref()
            .and_then(|penalties| penalties.get(label).copied())
            .unwrap_or(self.fail_penalty)
    }

    /// Per-class penalties, when configured, must cover exactly `num_classes` labels
    pub fn check_classes(&self, num_classes: usize) -> Result<()> {
        match &self.class_penalties {
            Some(penalties) if penalties.len() != num_classes => Err(BoostError::config(format!(
                "reward.class_penalties lists {} values for {num_classes} classes",
                penalties.len()
            ))),
            _ => Ok(()),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.skip_cost > 0.0 {
            return Err(BoostError::config("reward.skip_cost must be <= 0"));
        }
        if self.classify_cost > 0.0 {
            return Err(BoostError::config("reward.classify_cost must be <= 0"));
        }
        if self.terminate_cost != 0.0 {
            return Err(BoostError::config("reward.terminate_cost must be 0"));
        }
        let mut values = vec![
            self.skip_cost,
            self.classify_cost,
            self.success_reward,
            self.fail_penalty,
        ];
        if let Some(penalties) = &self.class_penalties {
            if penalties.is_empty() {
                return Err(BoostError::config(
                    "reward.class_penalties must list one value per class",
                ));
            }
            values.extend(penalties);
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(BoostError::config("reward values must be finite"));
        }
        Ok(())
    }
}

/// Which Q-function variant, and the state mapping that feeds it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepresentationKind {
    /// Step index x per-class margin bucket, folded into one table index
    Tabular,
    /// Discrete step index, continuous margin of the first class
    #[default]
    Rbf,
    /// Discrete step index, continuous margins of every class
    RbfVector,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepresentationConfig {
    pub kind: RepresentationKind,
    /// Inner bucket boundaries for the tabular margin discretization
    pub margin_buckets: Vec<f64>,
}

impl Default for RepresentationConfig {
    fn default() -> Self {
        Self {
            kind: RepresentationKind::default(),
            margin_buckets: vec![0.2, 0.4, 0.5, 0.6, 0.8],
        }
    }
}

impl RepresentationConfig {
    fn validate(&self) -> Result<()> {
        if self.margin_buckets.iter().any(|b| !(*b > 0.0 && *b < 1.0)) {
            return Err(BoostError::config(
                "representation.margin_buckets must lie strictly inside (0, 1)",
            ));
        }
        if self.margin_buckets.windows(2).any(|w| w[0] >= w[1]) {
            return Err(BoostError::config(
                "representation.margin_buckets must be strictly increasing",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub episodes: u64,
    /// Per-episode step cap
    pub max_steps: usize,
    /// Run the evaluator every this many episodes (0 disables)
    pub eval_interval: u64,
    /// Log progress every this many episodes (0 disables)
    pub log_interval: u64,
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            episodes: 10_000,
            max_steps: 1_000,
            eval_interval: 1_000,
            log_interval: 500,
            seed: 42,
        }
    }
}

impl TrainingConfig {
    fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            return Err(BoostError::config("training.max_steps must be positive"));
        }
        Ok(())
    }
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(BoostError::config(format!("{name} must lie in [0, 1], got {value}")))
    }
}
