//! State representation: environment state -> Q-function input
//!
//! Every mapping here is a pure function of the state. The tabular variant
//! folds independent discretizations into one composite index; the RBF
//! variants keep the step index discrete and pass the rescaled margins
//! through as continuous coordinates.

use serde::{Deserialize, Serialize};

use boostmdp_core::{BoostError, RepresentationConfig, RepresentationKind, Result};

use crate::state::State;

/// Input consumed by a Q-function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Observation {
    /// Composite index into a table
    Discrete(usize),
    /// Discrete step index plus continuous margin coordinates in `[0, 1]`
    Layered { step: usize, margins: Vec<f64> },
}

impl Observation {
    pub fn step(&self) -> Option<usize> {
        match self {
            Observation::Discrete(_) => None,
            Observation::Layered { step, .. } => Some(*step),
        }
    }
}

/// One independent discretization of a state
#[derive(Debug, Clone, PartialEq)]
pub enum Discretizer {
    /// Step index, `num_steps + 1` values
    Step { num_steps: usize },
    /// Bucket of one class's rescaled margin; boundaries are the inner cut points
    Margin { class: usize, boundaries: Vec<f64> },
}

impl Discretizer {
    pub fn num_states(&self) -> usize {
        match self {
            Discretizer::Step { num_steps } => num_steps + 1,
            Discretizer::Margin { boundaries, .. } => boundaries.len() + 1,
        }
    }

    pub fn discretize(&self, state: &State) -> Result<usize> {
        match self {
            Discretizer::Step { num_steps } => check_step(state.step, *num_steps),
            Discretizer::Margin { class, boundaries } => {
                let value = margin_of(state, *class)?;
                // Half-open buckets: a value on a boundary stays in the lower bucket
                Ok(boundaries.partition_point(|b| *b < value))
            }
        }
    }
}

/// Folds several discretizers into one mixed-radix index
#[derive(Debug, Clone, PartialEq)]
pub struct AndDiscretizer {
    parts: Vec<Discretizer>,
}

impl AndDiscretizer {
    pub fn new(parts: Vec<Discretizer>) -> Result<Self> {
        if parts.is_empty() {
            return Err(BoostError::config("an AND discretizer needs at least one part"));
        }
        Ok(Self { parts })
    }

    pub fn num_states(&self) -> usize {
        self.parts.iter().map(Discretizer::num_states).product()
    }

    pub fn discretize(&self, state: &State) -> Result<usize> {
        let mut index = 0;
        let mut stride = 1;
        for part in &self.parts {
            index += part.discretize(state)? * stride;
            stride *= part.num_states();
        }
        Ok(index)
    }
}

/// Discrete step index layered over continuous margins
#[derive(Debug, Clone, PartialEq)]
pub struct LayeredRepresentation {
    num_steps: usize,
    classes: Vec<usize>,
}

impl LayeredRepresentation {
    pub fn new(num_steps: usize, classes: Vec<usize>) -> Result<Self> {
        if classes.is_empty() {
            return Err(BoostError::config("layered representation needs a margin"));
        }
        Ok(Self { num_steps, classes })
    }

    pub fn num_steps(&self) -> usize {
        self.num_steps
    }

    pub fn dimensions(&self) -> usize {
        self.classes.len()
    }

    pub fn observe(&self, state: &State) -> Result<Observation> {
        let step = check_step(state.step, self.num_steps)?;
        let margins = self
            .classes
            .iter()
            .map(|&class| margin_of(state, class).map(|m| m.clamp(0.0, 1.0)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Observation::Layered { step, margins })
    }
}

/// The state mapping selected by configuration
#[derive(Debug, Clone, PartialEq)]
pub enum StateRepresentation {
    Tabular(AndDiscretizer),
    Layered(LayeredRepresentation),
}

impl StateRepresentation {
    pub fn from_config(
        config: &RepresentationConfig,
        num_steps: usize,
        num_classes: usize,
    ) -> Result<Self> {
        match config.kind {
            RepresentationKind::Tabular => {
                let mut parts = vec![Discretizer::Step { num_steps }];
                parts.extend((0..num_classes).map(|class| Discretizer::Margin {
                    class,
                    boundaries: config.margin_buckets.clone(),
                }));
                Ok(Self::Tabular(AndDiscretizer::new(parts)?))
            }
            RepresentationKind::Rbf => Ok(Self::Layered(LayeredRepresentation::new(
                num_steps,
                vec![0],
            )?)),
            RepresentationKind::RbfVector => Ok(Self::Layered(LayeredRepresentation::new(
                num_steps,
                (0..num_classes).collect(),
            )?)),
        }
    }

    /// Number of composite indices, for the tabular variant
    pub fn table_size(&self) -> Option<usize> {
        match self {
            StateRepresentation::Tabular(and) => Some(and.num_states()),
            StateRepresentation::Layered(_) => None,
        }
    }

    pub fn observe(&self, state: &State) -> Result<Observation> {
        match self {
            StateRepresentation::Tabular(and) => and.discretize(state).map(Observation::Discrete),
            StateRepresentation::Layered(layered) => layered.observe(state),
        }
    }
}

fn check_step(step: usize, num_steps: usize) -> Result<usize> {
    if step > num_steps {
        return Err(BoostError::domain(format!(
            "step index {step} outside [0, {num_steps}]"
        )));
    }
    Ok(step)
}

fn margin_of(state: &State, class: usize) -> Result<f64> {
    state.margins.get(class).copied().ok_or_else(|| {
        BoostError::domain(format!(
            "class {class} out of range ({} margins)",
            state.margins.len()
        ))
    })
}
