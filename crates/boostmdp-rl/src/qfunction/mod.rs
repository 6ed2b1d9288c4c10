//! Action-value functions
//!
//! Two variants share one capability interface: a dense table over
//! composite state indices and an adaptive RBF mixture. The variant is
//! chosen by configuration.

pub mod rbf;
pub mod tabular;

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tracing::info;

use boostmdp_core::{
    Action, ActionSet, BoostConfig, BoostError, LearningConfig, RbfConfig, RepresentationKind,
    Result,
};

use crate::representation::{Observation, StateRepresentation};
use crate::traces::EligibilityTraces;

pub use rbf::{Basis, BasisList, CenterAdded, RbfQFunction};
pub use tabular::TabularQFunction;

/// Partial derivatives of Q(s, a), laid out by the approximator
pub type Gradient = Vec<f64>;

/// Capability interface shared by every Q-function variant
pub trait QFunction {
    /// Q(input, action); unseen entries are 0
    fn value(&self, input: &Observation, action: Action) -> Result<f64>;

    /// Current length of the gradient vector at (input, action)
    fn parameter_count(&self, input: &Observation, action: Action) -> Result<usize>;

    fn gradient(&self, input: &Observation, action: Action) -> Result<Gradient>;

    /// Moves the parameters by `learning_rate * td_error * gradient`
    fn update_value(
        &mut self,
        input: &Observation,
        action: Action,
        td_error: f64,
        gradient: &[f64],
    ) -> Result<()>;

    fn set_learning_rate(&mut self, rate: f64);

    fn learning_rate(&self) -> f64;

    /// Number of updates rejected as numerically degenerate
    fn anomalies(&self) -> u64;

    fn save(&self, writer: &mut dyn Write) -> Result<()>;

    /// Trace engine matching this approximator's gradient layout
    fn trace_engine(&self, config: &LearningConfig) -> EligibilityTraces {
        EligibilityTraces::new(config)
    }
}

/// The Q-function variant selected by configuration
#[derive(Debug, Clone)]
pub enum QTable {
    Tabular(TabularQFunction),
    Rbf(RbfQFunction),
}

impl QTable {
    /// Fresh, all-zero Q-function matching `representation`
    pub fn from_config(config: &BoostConfig, representation: &StateRepresentation) -> Result<Self> {
        let rate = config.learning.learning_rate.value_at(0);
        match (config.representation.kind, representation) {
            (RepresentationKind::Tabular, StateRepresentation::Tabular(and)) => Ok(Self::Tabular(
                TabularQFunction::new(and.num_states(), rate),
            )),
            (
                RepresentationKind::Rbf | RepresentationKind::RbfVector,
                StateRepresentation::Layered(layered),
            ) => Ok(Self::Rbf(RbfQFunction::new(
                layered.num_steps(),
                layered.dimensions(),
                config.rbf.clone(),
                rate,
            ))),
            (kind, _) => Err(BoostError::config(format!(
                "representation kind {kind:?} does not match the state mapping"
            ))),
        }
    }

    pub fn as_rbf(&self) -> Option<&RbfQFunction> {
        match self {
            QTable::Rbf(rbf) => Some(rbf),
            QTable::Tabular(_) => None,
        }
    }

    /// Checks this function can consume observations of `representation`
    pub fn check_compatible(&self, representation: &StateRepresentation) -> Result<()> {
        match (self, representation) {
            (QTable::Tabular(table), StateRepresentation::Tabular(and))
                if table.num_states() == and.num_states() =>
            {
                Ok(())
            }
            (QTable::Rbf(rbf), StateRepresentation::Layered(layered))
                if rbf.num_steps() == layered.num_steps()
                    && rbf.dimensions() == layered.dimensions() =>
            {
                Ok(())
            }
            _ => Err(BoostError::config(
                "Q-function shape does not match the state representation",
            )),
        }
    }

    /// Largest value over `actions` at `input`, with its action (first wins ties)
    pub fn best_action(&self, input: &Observation, actions: &ActionSet) -> Result<(Action, f64)> {
        let mut best: Option<(Action, f64)> = None;
        for action in actions.iter() {
            let value = self.value(input, action)?;
            if best.map_or(true, |(_, v)| value > v) {
                best = Some((action, value));
            }
        }
        best.ok_or_else(|| BoostError::config("action set must not be empty"))
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        self.save(&mut writer)?;
        writer.flush()?;
        info!(path = %path.display(), "Saved Q-function");
        Ok(())
    }

    /// Reads either variant; the header line says which
    pub fn load(reader: &mut dyn BufRead, rbf: RbfConfig, learning_rate: f64) -> Result<Self> {
        let mut header = String::new();
        reader.read_line(&mut header)?;
        let fields: Vec<&str> = header.split_whitespace().collect();
        match fields.split_first() {
            Some((&"tabular", rest)) => Ok(QTable::Tabular(TabularQFunction::read_from(
                rest,
                reader,
                learning_rate,
            )?)),
            Some((&"rbf", rest)) => Ok(QTable::Rbf(RbfQFunction::read_from(
                rest,
                reader,
                rbf,
                learning_rate,
            )?)),
            _ => Err(BoostError::persistence(format!(
                "unrecognised Q-function header '{}'",
                header.trim()
            ))),
        }
    }

    /// Loads a serialized Q-function; failures here are fatal at startup
    pub fn load_from_file(
        path: impl AsRef<Path>,
        rbf: RbfConfig,
        learning_rate: f64,
    ) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = BufReader::new(File::open(path)?);
        let q = Self::load(&mut reader, rbf, learning_rate)?;
        info!(path = %path.display(), variant = q.variant_name(), "Loaded Q-function");
        Ok(q)
    }

    pub fn variant_name(&self) -> &'static str {
        match self {
            QTable::Tabular(_) => "tabular",
            QTable::Rbf(_) => "rbf",
        }
    }
}

impl QFunction for QTable {
    fn value(&self, input: &Observation, action: Action) -> Result<f64> {
        match self {
            QTable::Tabular(q) => q.value(input, action),
            QTable::Rbf(q) => q.value(input, action),
        }
    }

    fn parameter_count(&self, input: &Observation, action: Action) -> Result<usize> {
        match self {
            QTable::Tabular(q) => q.parameter_count(input, action),
            QTable::Rbf(q) => q.parameter_count(input, action),
        }
    }

    fn gradient(&self, input: &Observation, action: Action) -> Result<Gradient> {
        match self {
            QTable::Tabular(q) => q.gradient(input, action),
            QTable::Rbf(q) => q.gradient(input, action),
        }
    }

    fn update_value(
        &mut self,
        input: &Observation,
        action: Action,
        td_error: f64,
        gradient: &[f64],
    ) -> Result<()> {
        match self {
            QTable::Tabular(q) => q.update_value(input, action, td_error, gradient),
            QTable::Rbf(q) => q.update_value(input, action, td_error, gradient),
        }
    }

    fn set_learning_rate(&mut self, rate: f64) {
        match self {
            QTable::Tabular(q) => q.set_learning_rate(rate),
            QTable::Rbf(q) => q.set_learning_rate(rate),
        }
    }

    fn learning_rate(&self) -> f64 {
        match self {
            QTable::Tabular(q) => q.learning_rate(),
            QTable::Rbf(q) => q.learning_rate(),
        }
    }

    fn anomalies(&self) -> u64 {
        match self {
            QTable::Tabular(q) => q.anomalies(),
            QTable::Rbf(q) => q.anomalies(),
        }
    }

    fn save(&self, writer: &mut dyn Write) -> Result<()> {
        match self {
            QTable::Tabular(q) => q.save(writer),
            QTable::Rbf(q) => q.save(writer),
        }
    }

    fn trace_engine(&self, config: &LearningConfig) -> EligibilityTraces {
        match self {
            QTable::Tabular(q) => q.trace_engine(config),
            QTable::Rbf(q) => q.trace_engine(config),
        }
    }
}
