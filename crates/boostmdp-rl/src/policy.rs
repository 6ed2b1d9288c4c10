//! ε-greedy action selection over a Q-function

use rand::rngs::StdRng;
use rand::Rng;

use boostmdp_core::{Action, ActionSet, Result};

use crate::qfunction::QTable;
use crate::representation::Observation;

#[derive(Debug, Clone)]
pub struct EpsilonGreedy {
    epsilon: f64,
    actions: ActionSet,
}

impl EpsilonGreedy {
    pub fn new(epsilon: f64, actions: ActionSet) -> Self {
        Self { epsilon, actions }
    }

    /// Never explores; used for offline evaluation
    pub fn greedy(actions: ActionSet) -> Self {
        Self::new(0.0, actions)
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn set_epsilon(&mut self, epsilon: f64) {
        self.epsilon = epsilon;
    }

    pub fn actions(&self) -> &ActionSet {
        &self.actions
    }

    /// Highest-valued action; ties go to the earliest action in the set
    pub fn greedy_action(&self, q: &QTable, input: &Observation) -> Result<Action> {
        q.best_action(input, &self.actions).map(|(action, _)| action)
    }

    pub fn select(&self, q: &QTable, input: &Observation, rng: &mut StdRng) -> Result<Action> {
        // A greedy policy leaves the random stream untouched
        if self.epsilon > 0.0 && rng.gen::<f64>() < self.epsilon {
            let choice = rng.gen_range(0..self.actions.len());
            if let Some(action) = self.actions.get(choice) {
                return Ok(action);
            }
        }
        self.greedy_action(q, input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qfunction::{QFunction, TabularQFunction};
    use rand::SeedableRng;

    fn biased_table() -> QTable {
        let mut q = QTable::Tabular(TabularQFunction::new(1, 1.0));
        q.update_value(&Observation::Discrete(0), Action::Terminate, 5.0, &[1.0])
            .unwrap();
        q
    }

    #[test]
    fn test_zero_epsilon_is_deterministic() {
        let q = biased_table();
        let policy = EpsilonGreedy::greedy(ActionSet::default());
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let action = policy.select(&q, &Observation::Discrete(0), &mut rng).unwrap();
            assert_eq!(action, Action::Terminate);
        }
    }

    #[test]
    fn test_full_epsilon_is_uniform() {
        let q = biased_table();
        let policy = EpsilonGreedy::new(1.0, ActionSet::default());
        let mut rng = StdRng::seed_from_u64(11);
        let mut counts = [0usize; 3];
        let draws = 30_000;
        for _ in 0..draws {
            let action = policy.select(&q, &Observation::Discrete(0), &mut rng).unwrap();
            counts[action.to_index()] += 1;
        }
        for count in counts {
            let share = count as f64 / draws as f64;
            assert!((share - 1.0 / 3.0).abs() < 0.02, "share {share}");
        }
    }

    #[test]
    fn test_restricted_action_set() {
        let q = biased_table();
        let actions = ActionSet::new(vec![Action::Skip, Action::Classify]).unwrap();
        let policy = EpsilonGreedy::new(1.0, actions);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let action = policy.select(&q, &Observation::Discrete(0), &mut rng).unwrap();
            assert_ne!(action, Action::Terminate);
        }
    }
}
