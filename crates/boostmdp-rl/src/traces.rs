//! Eligibility trace engine
//!
//! Traces are per-parameter: each entry keeps a gradient vector for the
//! (input, action) it was recorded at. Every step the vector is decayed by
//! λγ and the gradient re-evaluated at the entry's own input is added, so
//! components for RBF centers grown after recording are picked up.

use tracing::{debug, warn};

use boostmdp_core::{Action, LearningConfig, Result};

use crate::qfunction::{Gradient, QFunction};
use crate::representation::Observation;

/// Gradient trace for one visited (input, action) pair
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEntry {
    pub action: Action,
    pub input: Observation,
    pub gradient: Gradient,
}

#[derive(Debug, Clone)]
pub struct EligibilityTraces {
    lambda: f64,
    gamma: f64,
    replacing: bool,
    threshold: Option<f64>,
    entries: Vec<TraceEntry>,
    warned: bool,
}

impl EligibilityTraces {
    pub fn new(config: &LearningConfig) -> Self {
        Self {
            lambda: config.lambda,
            gamma: config.gamma,
            replacing: config.replacing_traces,
            threshold: config.trace_threshold,
            entries: Vec::new(),
            warned: false,
        }
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in recording order
    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn decay_factor(&self) -> f64 {
        self.lambda * self.gamma
    }

    /// Records the gradient of Q at (input, action).
    ///
    /// A pair already in the list keeps its position: replacing traces
    /// overwrite its gradient, accumulating traces add to it.
    pub fn add_trace<Q: QFunction + ?Sized>(
        &mut self,
        input: Observation,
        action: Action,
        q: &Q,
    ) -> Result<()> {
        let gradient = q.gradient(&input, action)?;

        let existing = self
            .entries
            .iter_mut()
            .find(|e| e.action == action && e.input == input);
        match existing {
            Some(entry) if self.replacing => entry.gradient = gradient,
            Some(entry) => accumulate(&mut entry.gradient, &gradient),
            None => self.entries.push(TraceEntry {
                action,
                input,
                gradient,
            }),
        }
        Ok(())
    }

    /// `e <- λγ·e + ∇Q(entry)` for every entry, the gradient evaluated at
    /// the entry's own input against the current basis set.
    pub fn update_traces<Q: QFunction + ?Sized>(&mut self, q: &Q) -> Result<()> {
        let factor = self.decay_factor();
        for entry in &mut self.entries {
            for component in &mut entry.gradient {
                *component *= factor;
            }
            let fresh = q.gradient(&entry.input, entry.action)?;
            accumulate(&mut entry.gradient, &fresh);
        }

        if let Some(threshold) = self.threshold {
            self.prune(threshold);
        }
        Ok(())
    }

    fn prune(&mut self, threshold: f64) {
        if !self.warned {
            warn!(
                threshold,
                "Trace pruning enabled; entries below the threshold are dropped"
            );
            self.warned = true;
        }
        let before = self.entries.len();
        self.entries.retain(|entry| {
            entry
                .gradient
                .iter()
                .any(|component| component.abs() >= threshold)
        });
        if self.entries.len() < before {
            debug!(pruned = before - self.entries.len(), "Pruned trace entries");
        }
    }

    /// Applies `td` through every entry, in recording order
    pub fn update_q_function<Q: QFunction + ?Sized>(&self, td_error: f64, q: &mut Q) -> Result<()> {
        for entry in &self.entries {
            q.update_value(&entry.input, entry.action, td_error, &entry.gradient)?;
        }
        Ok(())
    }
}

/// Adds `fresh` into `trace`, growing it for centers added since recording
fn accumulate(trace: &mut Gradient, fresh: &[f64]) {
    if trace.len() < fresh.len() {
        trace.resize(fresh.len(), 0.0);
    }
    for (component, g) in trace.iter_mut().zip(fresh) {
        *component += g;
    }
}
