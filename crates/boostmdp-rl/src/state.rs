//! State, Action, and Reward types for the early-exit MDP

use serde::{Deserialize, Serialize};

pub use boostmdp_core::Action;

/// Reward value from the reward model
pub type Reward = f64;

/// Snapshot of one example's progress through the ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Example being classified
    pub example: usize,
    /// Index of the next classifier, in `0..=N`
    pub step: usize,
    /// Number of classifiers actually evaluated so far
    pub applied: usize,
    /// True class; hidden from the agent by the state representation
    pub label: usize,
    /// Accumulated `sum(weight * vote)` per class
    pub raw_margins: Vec<f64>,
    /// `raw_margins` rescaled into `[0, 1]`
    pub margins: Vec<f64>,
    /// Set once the agent chose `Terminate`
    pub terminated: bool,
}

impl State {
    /// Class with the strictly largest margin, if any
    pub fn predicted_class(&self) -> Option<usize> {
        let (best, best_margin) = self
            .raw_margins
            .iter()
            .copied()
            .enumerate()
            .fold((None, f64::NEG_INFINITY), |(best, max), (k, m)| {
                if m > max {
                    (Some(k), m)
                } else {
                    (best, max)
                }
            });
        let tied = self
            .raw_margins
            .iter()
            .filter(|&&m| m == best_margin)
            .count();
        if tied == 1 {
            best
        } else {
            None
        }
    }

    /// Ties, including the all-zero margin of an untouched example, count as wrong
    pub fn is_correct(&self) -> bool {
        self.predicted_class() == Some(self.label)
    }
}

/// One (s, a, r, s') step of an episode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    pub state: State,
    pub action: Action,
    pub reward: Reward,
    pub next_state: State,
    pub terminal: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_state(raw_margins: Vec<f64>, label: usize) -> State {
        let classes = raw_margins.len();
        State {
            example: 4,
            step: 2,
            applied: 1,
            label,
            raw_margins,
            margins: vec![0.5; classes],
            terminated: false,
        }
    }

    #[test]
    fn test_predicted_class() {
        let state = create_test_state(vec![0.2, 1.5, -0.3], 1);
        assert_eq!(state.predicted_class(), Some(1));
        assert!(state.is_correct());
    }

    #[test]
    fn test_tied_margins_are_incorrect() {
        let zero = create_test_state(vec![0.0, 0.0], 0);
        assert_eq!(zero.predicted_class(), None);
        assert!(!zero.is_correct());

        let tied = create_test_state(vec![1.0, 1.0, -2.0], 0);
        assert!(!tied.is_correct());
    }

    #[test]
    fn test_state_serialization() {
        let state = create_test_state(vec![0.7, -0.7], 0);
        let json = serde_json::to_string(&state).unwrap();
        let parsed: State = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, state);
    }
}
