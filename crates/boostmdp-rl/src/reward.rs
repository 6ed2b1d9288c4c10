//! Reward model for the early-exit MDP

use boostmdp_core::{Action, RewardConfig, RewardMode};

use crate::state::{Reward, State};

/// Scores transitions for the episode driver
pub trait RewardModel {
    /// Forget per-episode bookkeeping; called when an episode starts
    fn reset(&mut self);

    /// Reward for `old --action--> new`; `terminal` tells whether `new` ends the episode
    fn reward(&mut self, old: &State, action: Action, new: &State, terminal: bool) -> Reward;
}

/// Per-action costs plus a terminal evaluation of the accumulated margin.
///
/// In incremental mode the terminal evaluation is paid out as it changes:
/// each classify step earns `eval(new) - last_reward`, so the episode total
/// equals the non-incremental total.
#[derive(Debug, Clone)]
pub struct BoostingReward {
    config: RewardConfig,
    last_reward: f64,
}

impl BoostingReward {
    pub fn new(config: RewardConfig) -> Self {
        Self {
            config,
            last_reward: 0.0,
        }
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    fn action_cost(&self, action: Action) -> f64 {
        match action {
            Action::Skip => self.config.skip_cost,
            Action::Classify => self.config.classify_cost,
            Action::Terminate => self.config.terminate_cost,
        }
    }

    fn hamming(&self, state: &State) -> f64 {
        if state.is_correct() {
            self.config.success_reward
        } else {
            self.config.penalty_for(state.label)
        }
    }

    /// Terminal evaluation of a state's margin
    pub fn evaluate(&self, state: &State) -> f64 {
        match self.config.mode {
            RewardMode::Hamming => self.hamming(state),
            // Exponential loss is undefined before any vote has been cast
            RewardMode::Exponential if state.applied == 0 => self.hamming(state),
            RewardMode::Exponential => {
                let classes = state.raw_margins.len().max(1) as f64;
                let loss: f64 = state
                    .raw_margins
                    .iter()
                    .enumerate()
                    .map(|(k, m)| {
                        let y = if k == state.label { 1.0 } else { -1.0 };
                        (-y * m).exp()
                    })
                    .sum::<f64>()
                    / classes;
                1.0 / loss
            }
        }
    }
}

impl RewardModel for BoostingReward {
    fn reset(&mut self) {
        self.last_reward = 0.0;
    }

    fn reward(&mut self, _old: &State, action: Action, new: &State, terminal: bool) -> Reward {
        let mut reward = self.action_cost(action);

        if self.config.incremental {
            if action == Action::Classify || terminal {
                let current = self.evaluate(new);
                reward += current - self.last_reward;
                self.last_reward = current;
            }
        } else if terminal {
            reward += self.evaluate(new);
        }

        reward
    }
}
