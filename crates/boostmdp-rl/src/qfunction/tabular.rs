//! Tabular Q-function over composite state indices

use std::io::{BufRead, Write};

use ndarray::Array2;
use tracing::warn;

use boostmdp_core::{Action, BoostError, Result};

use super::{Gradient, QFunction};
use crate::representation::Observation;

/// Dense `[action, composite index]` table, zero-initialised
#[derive(Debug, Clone)]
pub struct TabularQFunction {
    table: Array2<f64>,
    learning_rate: f64,
    anomalies: u64,
}

impl TabularQFunction {
    pub fn new(num_states: usize, learning_rate: f64) -> Self {
        Self {
            table: Array2::zeros((Action::action_space_size(), num_states)),
            learning_rate,
            anomalies: 0,
        }
    }

    pub fn num_states(&self) -> usize {
        self.table.ncols()
    }

    /// Every entry stored for `action`, by composite index
    pub fn values_for(&self, action: Action) -> impl Iterator<Item = f64> + '_ {
        self.table.row(action.to_index()).into_iter().copied()
    }

    fn index(&self, input: &Observation) -> Result<usize> {
        match input {
            Observation::Discrete(index) if *index < self.num_states() => Ok(*index),
            Observation::Discrete(index) => Err(BoostError::domain(format!(
                "state index {index} outside table of {} states",
                self.num_states()
            ))),
            Observation::Layered { .. } => Err(BoostError::domain(
                "tabular Q-function needs a discrete observation",
            )),
        }
    }

    /// Reads the body following a `tabular <actions> <states>` header
    pub(crate) fn read_from(
        header: &[&str],
        reader: &mut dyn BufRead,
        learning_rate: f64,
    ) -> Result<Self> {
        let [actions, states] = header else {
            return Err(BoostError::persistence("tabular header needs actions and states"));
        };
        let parse_count = |field: &str| {
            field
                .parse::<usize>()
                .map_err(|_| BoostError::persistence(format!("cannot parse '{field}'")))
        };
        let actions = parse_count(*actions)?;
        let states = parse_count(*states)?;
        if actions != Action::action_space_size() {
            return Err(BoostError::persistence(format!(
                "table lists {actions} actions, expected {}",
                Action::action_space_size()
            )));
        }

        let mut q = Self::new(states, learning_rate);
        let mut rows = 0;
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if rows == actions {
                return Err(BoostError::persistence("more rows than actions"));
            }
            let values = line
                .split_whitespace()
                .map(|f| {
                    f.parse::<f64>()
                        .map_err(|_| BoostError::persistence(format!("cannot parse '{f}'")))
                })
                .collect::<Result<Vec<_>>>()?;
            if values.len() != states {
                return Err(BoostError::persistence(format!(
                    "row {rows} has {} values, expected {states}",
                    values.len()
                )));
            }
            for (cell, value) in q.table.row_mut(rows).iter_mut().zip(values) {
                *cell = value;
            }
            rows += 1;
        }
        if rows != actions {
            return Err(BoostError::persistence(format!(
                "found {rows} rows, expected {actions}"
            )));
        }
        Ok(q)
    }
}

impl QFunction for TabularQFunction {
    fn value(&self, input: &Observation, action: Action) -> Result<f64> {
        let index = self.index(input)?;
        Ok(self.table[[action.to_index(), index]])
    }

    fn parameter_count(&self, input: &Observation, _action: Action) -> Result<usize> {
        self.index(input)?;
        Ok(1)
    }

    /// The single component is the trace factor of the visited cell
    fn gradient(&self, input: &Observation, _action: Action) -> Result<Gradient> {
        self.index(input)?;
        Ok(vec![1.0])
    }

    fn update_value(
        &mut self,
        input: &Observation,
        action: Action,
        td_error: f64,
        gradient: &[f64],
    ) -> Result<()> {
        let index = self.index(input)?;
        let trace_factor = match gradient {
            [factor] => *factor,
            _ => {
                return Err(BoostError::domain(format!(
                    "tabular update expects one trace factor, got {}",
                    gradient.len()
                )))
            }
        };

        let cell = &mut self.table[[action.to_index(), index]];
        let updated = *cell + self.learning_rate * td_error * trace_factor;
        if updated.is_finite() {
            *cell = updated;
        } else {
            warn!(%action, index, td_error, "Rejected non-finite tabular update");
            self.anomalies += 1;
        }
        Ok(())
    }

    fn set_learning_rate(&mut self, rate: f64) {
        self.learning_rate = rate;
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn anomalies(&self) -> u64 {
        self.anomalies
    }

    fn save(&self, writer: &mut dyn Write) -> Result<()> {
        writeln!(writer, "tabular {} {}", self.table.nrows(), self.table.ncols())?;
        for row in self.table.rows() {
            let line: Vec<String> = row.iter().map(|v| format!("{v:e}")).collect();
            writeln!(writer, "{}", line.join(" "))?;
        }
        Ok(())
    }
}
