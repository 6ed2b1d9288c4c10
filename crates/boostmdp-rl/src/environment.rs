//! Environment model: walking through the ensemble one classifier at a time

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::Rng;

use boostmdp_core::{Action, BoostError, Result};

use crate::state::State;
use crate::weak::WeakHypotheses;

/// Dynamics the episode driver relies on
pub trait Environment {
    /// Number of classifiers N
    fn num_steps(&self) -> usize;

    fn num_classes(&self) -> usize;

    /// Number of instances the environment can be reset to
    fn num_instances(&self) -> usize;

    fn transition(&self, state: &State, action: Action) -> Result<State>;

    fn is_terminal(&self, state: &State) -> bool;

    /// The episode must end once this holds
    fn is_reset_state(&self, state: &State) -> bool;

    /// Fresh start state for a randomly drawn instance
    fn reset_state(&self, rng: &mut StdRng) -> Result<State>;

    /// Fresh start state for a given instance
    fn reset_to(&self, instance: usize) -> Result<State>;
}

/// Boosted-ensemble environment over a set of weak hypotheses
pub struct BoostingEnvironment<W> {
    hypotheses: Arc<W>,
}

impl<W> Clone for BoostingEnvironment<W> {
    fn clone(&self) -> Self {
        Self {
            hypotheses: Arc::clone(&self.hypotheses),
        }
    }
}

impl<W: WeakHypotheses> BoostingEnvironment<W> {
    pub fn new(hypotheses: Arc<W>) -> Result<Self> {
        if hypotheses.num_examples() == 0 {
            return Err(BoostError::config("vote table holds no examples"));
        }
        Ok(Self { hypotheses })
    }

    pub fn hypotheses(&self) -> &W {
        &self.hypotheses
    }

    fn rescale(&self, raw: f64) -> f64 {
        let total = self.hypotheses.total_weight();
        if total > 0.0 {
            ((raw / total + 1.0) / 2.0).clamp(0.0, 1.0)
        } else {
            0.5
        }
    }
}

impl<W: WeakHypotheses> Environment for BoostingEnvironment<W> {
    fn num_steps(&self) -> usize {
        self.hypotheses.num_hypotheses()
    }

    fn num_classes(&self) -> usize {
        self.hypotheses.num_classes()
    }

    fn num_instances(&self) -> usize {
        self.hypotheses.num_examples()
    }

    fn transition(&self, state: &State, action: Action) -> Result<State> {
        let n = self.num_steps();
        if state.step > n {
            return Err(BoostError::domain(format!(
                "step index {} outside [0, {n}]",
                state.step
            )));
        }
        if self.is_terminal(state) {
            return Err(BoostError::domain("transition requested from a terminal state"));
        }

        let mut next = state.clone();
        match action {
            Action::Skip => next.step += 1,
            Action::Classify => {
                let vote = self.hypotheses.vote(state.step, state.example)?;
                for (raw, v) in next.raw_margins.iter_mut().zip(vote.values.iter()) {
                    *raw += vote.weight * v;
                }
                for (scaled, raw) in next.margins.iter_mut().zip(&next.raw_margins) {
                    *scaled = self.rescale(*raw);
                }
                next.applied += 1;
                next.step += 1;
            }
            Action::Terminate => next.terminated = true,
        }
        Ok(next)
    }

    fn is_terminal(&self, state: &State) -> bool {
        state.terminated || state.step >= self.num_steps()
    }

    fn is_reset_state(&self, state: &State) -> bool {
        self.is_terminal(state)
    }

    fn reset_state(&self, rng: &mut StdRng) -> Result<State> {
        let instance = rng.gen_range(0..self.num_instances());
        self.reset_to(instance)
    }

    fn reset_to(&self, instance: usize) -> Result<State> {
        let label = self.hypotheses.label(instance)?;
        let classes = self.num_classes();
        Ok(State {
            example: instance,
            step: 0,
            applied: 0,
            label,
            raw_margins: vec![0.0; classes],
            margins: vec![self.rescale(0.0); classes],
            terminated: false,
        })
    }
}
