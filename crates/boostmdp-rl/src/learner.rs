//! TD(λ) learning subscriber
//!
//! Turns each step event into a Q-learning TD error, grows RBF centers
//! where the growth rule asks for them, and pushes the error through the
//! eligibility traces.

use serde::Serialize;
use tracing::{debug, warn};

use boostmdp_core::{ActionSet, LearningConfig, Result};

use crate::qfunction::{QFunction, QTable};
use crate::representation::{Observation, StateRepresentation};
use crate::state::Transition;
use crate::traces::EligibilityTraces;

/// Running totals kept by the learner
#[derive(Debug, Clone, Default, Serialize)]
pub struct LearnerStats {
    pub updates: u64,
    pub centers_added: u64,
    /// Steps whose TD error was not finite
    pub anomalies: u64,
    pub td_abs_sum: f64,
}

impl LearnerStats {
    pub fn mean_abs_td(&self) -> f64 {
        if self.updates == 0 {
            0.0
        } else {
            self.td_abs_sum / self.updates as f64
        }
    }
}

/// Mutable learning state the driver lends to the learner for one step
pub struct LearningContext<'a> {
    pub q: &'a mut QTable,
    pub traces: &'a mut EligibilityTraces,
    pub representation: &'a StateRepresentation,
}

#[derive(Debug, Clone)]
pub struct TdLearner {
    gamma: f64,
    actions: ActionSet,
    stats: LearnerStats,
}

impl TdLearner {
    pub fn new(config: &LearningConfig) -> Self {
        Self {
            gamma: config.gamma,
            actions: config.actions.clone(),
            stats: LearnerStats::default(),
        }
    }

    pub fn stats(&self) -> &LearnerStats {
        &self.stats
    }

    /// Called before any observer sees the new episode; the only place traces are cleared
    pub fn on_new_episode(&mut self, traces: &mut EligibilityTraces) {
        traces.reset();
    }

    /// `r + γ max_a' Q(s', a') - Q(s, a)`, with no bootstrap from a terminal s'
    pub fn td_error(
        &self,
        q: &QTable,
        representation: &StateRepresentation,
        input: &Observation,
        event: &Transition,
    ) -> Result<f64> {
        let current = q.value(input, event.action)?;
        let future = if event.terminal {
            0.0
        } else {
            let next = representation.observe(&event.next_state)?;
            q.best_action(&next, &self.actions)?.1
        };
        Ok(event.reward + self.gamma * future - current)
    }

    /// Learns from one step; returns the TD error
    pub fn on_step(&mut self, ctx: LearningContext<'_>, event: &Transition) -> Result<f64> {
        let LearningContext {
            q,
            traces,
            representation,
        } = ctx;
        let input = representation.observe(&event.state)?;
        let td = self.td_error(q, representation, &input, event)?;

        if !td.is_finite() {
            warn!(
                action = %event.action,
                step = event.state.step,
                td,
                "Non-finite TD error; skipping update"
            );
            self.stats.anomalies += 1;
            traces.update_traces(&*q)?;
            traces.add_trace(input, event.action, &*q)?;
            return Ok(td);
        }

        let mut grew = false;
        if let (QTable::Rbf(rbf), Observation::Layered { step, margins }) = (&mut *q, &input) {
            if rbf.should_grow(&input, event.action, td)? {
                grew = rbf.add_center(td, margins, *step, event.action)?.is_some();
            }
        }

        if grew {
            self.stats.centers_added += 1;
        }
        traces.update_traces(&*q)?;
        traces.add_trace(input, event.action, &*q)?;
        traces.update_q_function(td, q)?;

        self.stats.updates += 1;
        self.stats.td_abs_sum += td.abs();
        debug!(
            action = %event.action,
            step = event.state.step,
            reward = event.reward,
            td,
            grew,
            "TD update"
        );
        Ok(td)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qfunction::{RbfQFunction, TabularQFunction};
    use crate::state::State;
    use boostmdp_core::{Action, RbfConfig, RepresentationConfig, RepresentationKind};

    fn state(step: usize, margin: f64) -> State {
        State {
            example: 0,
            step,
            applied: step,
            label: 0,
            raw_margins: vec![0.0, 0.0],
            margins: vec![margin, 1.0 - margin],
            terminated: false,
        }
    }

    fn event(from: State, action: Action, reward: f64, to: State, terminal: bool) -> Transition {
        Transition {
            state: from,
            action,
            reward,
            next_state: to,
            terminal,
        }
    }

    fn learning(lambda: f64) -> LearningConfig {
        LearningConfig {
            lambda,
            gamma: 1.0,
            ..LearningConfig::default()
        }
    }

    #[test]
    fn test_terminal_step_does_not_bootstrap() {
        let config = RepresentationConfig {
            kind: RepresentationKind::Tabular,
            ..RepresentationConfig::default()
        };
        let representation = StateRepresentation::from_config(&config, 2, 2).unwrap();
        let size = representation.table_size().unwrap();
        let mut q = QTable::Tabular(TabularQFunction::new(size, 1.0));

        // Give the successor a large value: it must be ignored at a terminal step
        let next = state(2, 0.5);
        let next_input = representation.observe(&next).unwrap();
        q.update_value(&next_input, Action::Skip, 100.0, &[1.0]).unwrap();

        let mut traces = EligibilityTraces::new(&learning(0.0));
        let mut learner = TdLearner::new(&learning(0.0));
        let td = learner
            .on_step(
                LearningContext {
                    q: &mut q,
                    traces: &mut traces,
                    representation: &representation,
                },
                &event(state(1, 0.5), Action::Classify, 3.0, next, true),
            )
            .unwrap();
        assert_eq!(td, 3.0);
        let input = representation.observe(&state(1, 0.5)).unwrap();
        assert_eq!(q.value(&input, Action::Classify).unwrap(), 3.0);
        assert_eq!(learner.stats().updates, 1);
    }

    #[test]
    fn test_rbf_growth_seeds_alpha_then_updates_through_traces() {
        let config = RepresentationConfig::default();
        let representation = StateRepresentation::from_config(&config, 3, 2).unwrap();
        let mut q = QTable::Rbf(RbfQFunction::new(3, 1, RbfConfig::default(), 0.5));
        let mut traces = EligibilityTraces::new(&learning(0.9));
        let mut learner = TdLearner::new(&learning(0.9));

        let td = learner
            .on_step(
                LearningContext {
                    q: &mut q,
                    traces: &mut traces,
                    representation: &representation,
                },
                &event(state(0, 0.3), Action::Skip, -2.0, state(1, 0.3), false),
            )
            .unwrap();
        assert_eq!(td, -2.0);
        assert_eq!(learner.stats().centers_added, 1);

        // Seeded with td, then td applied through the fresh trace: -2 + 0.5 * -2 * 1
        let rbf = q.as_rbf().unwrap();
        let basis = rbf.list(0, Action::Skip).unwrap().slot(0).unwrap();
        assert_eq!(basis.alpha, -3.0);
        assert_eq!(basis.mean, vec![0.3]);
        assert_eq!(traces.len(), 1);
    }
}
