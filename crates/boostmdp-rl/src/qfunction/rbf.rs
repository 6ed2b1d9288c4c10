//! Adaptive radial-basis-function Q-function
//!
//! One list of Gaussian centers per (action, step index). Centers are added
//! online where coverage is sparse or where the TD error cannot be explained
//! by the current mixture. Each list is an arena: bases live in creation
//! order and are referenced by slot, while `order` keeps the slots sorted by
//! mean. Gradient vectors are laid out by slot, so inserting a center never
//! shifts the meaning of an existing gradient component.
//!
//! Per-slot parameter layout: `[alpha, mean_1..mean_D, sigma_1..sigma_D]`.
//! With D > 1 the activation is the product of the per-dimension Gaussians
//! while a single alpha scales the whole basis.

use std::cmp::Ordering;
use std::io::{BufRead, Write};

use tracing::{debug, warn};

use boostmdp_core::{Action, BoostError, RbfConfig, Result};

use super::{Gradient, QFunction};
use crate::representation::Observation;

/// Below this many centers a new center gets the configured default width
const NEIGHBOUR_RULE_MIN_CENTERS: usize = 10;

/// Gap kept between a new center's width and its neighbours' reach
const SIGMA_SAFETY_MARGIN: f64 = 0.001;

/// One Gaussian center
#[derive(Debug, Clone, PartialEq)]
pub struct Basis {
    pub alpha: f64,
    pub mean: Vec<f64>,
    pub sigma: Vec<f64>,
}

impl Basis {
    pub fn activation(&self, x: &[f64]) -> f64 {
        self.mean
            .iter()
            .zip(&self.sigma)
            .zip(x)
            .map(|((mean, sigma), x)| {
                let d = x - mean;
                (-(d * d) / (2.0 * sigma * sigma)).exp()
            })
            .product()
    }

    fn is_sound(&self) -> bool {
        self.alpha.is_finite()
            && self.mean.iter().all(|m| m.is_finite())
            && self.sigma.iter().all(|s| s.is_finite() && *s > 0.0)
    }
}

fn cmp_means(a: &[f64], b: &[f64]) -> Ordering {
    a.partial_cmp(b).unwrap_or(Ordering::Equal)
}

/// Centers of one (action, step index) pair
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BasisList {
    slots: Vec<Basis>,
    order: Vec<usize>,
}

impl BasisList {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Basis stored in `slot`
    pub fn slot(&self, slot: usize) -> Option<&Basis> {
        self.slots.get(slot)
    }

    /// Bases in ascending-mean order
    pub fn iter_sorted(&self) -> impl Iterator<Item = &Basis> + '_ {
        self.order.iter().map(move |&slot| &self.slots[slot])
    }

    /// Inserts after any center with an equal mean; returns the new slot
    pub fn insert(&mut self, basis: Basis) -> usize {
        let slot = self.slots.len();
        let position = self
            .order
            .partition_point(|&s| cmp_means(&self.slots[s].mean, &basis.mean) != Ordering::Greater);
        self.slots.push(basis);
        self.order.insert(position, slot);
        slot
    }

    fn resort(&mut self) {
        let slots = &self.slots;
        self.order
            .sort_by(|&a, &b| cmp_means(&slots[a].mean, &slots[b].mean));
    }

    // Sums run in mean order so a reloaded list reproduces values bit for bit
    pub fn activation(&self, x: &[f64]) -> f64 {
        self.iter_sorted().map(|b| b.activation(x)).sum()
    }

    pub fn value(&self, x: &[f64], normalized: bool) -> f64 {
        let (weighted, total) = self.iter_sorted().fold((0.0, 0.0), |(w, t), b| {
            let phi = b.activation(x);
            (w + b.alpha * phi, t + phi)
        });
        if !normalized {
            weighted
        } else if total > 0.0 {
            weighted / total
        } else {
            0.0
        }
    }

    pub fn max_abs_alpha(&self) -> f64 {
        self.slots.iter().map(|b| b.alpha.abs()).fold(0.0, f64::max)
    }
}

/// Outcome of a successful `add_center` call
#[derive(Debug, Clone, PartialEq)]
pub struct CenterAdded {
    pub slot: usize,
    pub sigma: Vec<f64>,
    /// Largest |alpha| in the list after insertion
    pub max_abs_alpha: f64,
}

#[derive(Debug, Clone)]
pub struct RbfQFunction {
    lists: Vec<BasisList>,
    num_steps: usize,
    dims: usize,
    config: RbfConfig,
    learning_rate: f64,
    anomalies: u64,
}

impl RbfQFunction {
    /// Empty function over step indices `0..=num_steps` and `dims` margin coordinates
    pub fn new(num_steps: usize, dims: usize, config: RbfConfig, learning_rate: f64) -> Self {
        let lists = vec![BasisList::default(); Action::action_space_size() * (num_steps + 1)];
        Self {
            lists,
            num_steps,
            dims,
            config,
            learning_rate,
            anomalies: 0,
        }
    }

    pub fn num_steps(&self) -> usize {
        self.num_steps
    }

    pub fn dimensions(&self) -> usize {
        self.dims
    }

    pub fn config(&self) -> &RbfConfig {
        &self.config
    }

    fn params_per_basis(&self) -> usize {
        1 + 2 * self.dims
    }

    fn key(&self, step: usize, action: Action) -> Result<usize> {
        if step > self.num_steps {
            return Err(BoostError::domain(format!(
                "step index {step} outside [0, {}]",
                self.num_steps
            )));
        }
        Ok(action.to_index() * (self.num_steps + 1) + step)
    }

    pub fn list(&self, step: usize, action: Action) -> Result<&BasisList> {
        let key = self.key(step, action)?;
        Ok(&self.lists[key])
    }

    /// Total number of centers across every list
    pub fn total_centers(&self) -> usize {
        self.lists.iter().map(BasisList::len).sum()
    }

    fn split<'a>(&self, input: &'a Observation) -> Result<(usize, &'a [f64])> {
        match input {
            Observation::Layered { step, margins } if margins.len() == self.dims => {
                Ok((*step, margins.as_slice()))
            }
            Observation::Layered { margins, .. } => Err(BoostError::domain(format!(
                "expected {} margin coordinates, got {}",
                self.dims,
                margins.len()
            ))),
            Observation::Discrete(_) => Err(BoostError::domain(
                "RBF Q-function needs a layered observation",
            )),
        }
    }

    /// Summed activation of the centers at `input`
    pub fn activation(&self, input: &Observation, action: Action) -> Result<f64> {
        let (step, x) = self.split(input)?;
        Ok(self.list(step, action)?.activation(x))
    }

    pub fn max_abs_alpha(&self, step: usize, action: Action) -> Result<f64> {
        Ok(self.list(step, action)?.max_abs_alpha())
    }

    /// Whether the growth rule asks for a new center at `input`
    pub fn should_grow(&self, input: &Observation, action: Action, td_error: f64) -> Result<bool> {
        let (step, x) = self.split(input)?;
        let list = self.list(step, action)?;
        if list.len() >= self.config.max_centers {
            return Ok(false);
        }
        let sparse = list.activation(x) < self.config.min_activation;
        let unexplained =
            td_error.abs() > list.max_abs_alpha() / self.config.max_td_error_divisor;
        Ok(sparse || unexplained)
    }

    /// Adds a center at `position` seeded with `td_error` as its alpha.
    ///
    /// Returns `None` when the list already holds `max_centers` bases.
    pub fn add_center(
        &mut self,
        td_error: f64,
        position: &[f64],
        step: usize,
        action: Action,
    ) -> Result<Option<CenterAdded>> {
        if position.len() != self.dims {
            return Err(BoostError::domain(format!(
                "center has {} coordinates, expected {}",
                position.len(),
                self.dims
            )));
        }
        if !td_error.is_finite() || position.iter().any(|p| !p.is_finite()) {
            warn!(td_error, ?position, "Refusing to add a non-finite center");
            self.anomalies += 1;
            return Ok(None);
        }

        let key = self.key(step, action)?;
        if self.lists[key].len() >= self.config.max_centers {
            return Ok(None);
        }

        let sigma: Vec<f64> = (0..self.dims)
            .map(|d| self.center_width(&self.lists[key], position[d], d))
            .collect();
        let list = &mut self.lists[key];
        let slot = list.insert(Basis {
            alpha: td_error,
            mean: position.to_vec(),
            sigma: sigma.clone(),
        });
        let max_abs_alpha = list.max_abs_alpha();

        debug!(
            %action,
            step,
            slot,
            centers = list.len(),
            alpha = td_error,
            ?sigma,
            "Added RBF center"
        );

        Ok(Some(CenterAdded {
            slot,
            sigma,
            max_abs_alpha,
        }))
    }

    /// Width of a new center along dimension `d`.
    ///
    /// Few centers: the default width. Otherwise the free room between the
    /// nearest neighbours' 4-sigma reach on either side, less a safety
    /// margin, falling back to the default when that exceeds `max_sigma` or
    /// leaves no room at all.
    fn center_width(&self, list: &BasisList, x: f64, d: usize) -> f64 {
        if list.len() < NEIGHBOUR_RULE_MIN_CENTERS {
            return self.config.initial_sigma;
        }

        let mut left: Option<&Basis> = None;
        let mut right: Option<&Basis> = None;
        for basis in &list.slots {
            let mean = basis.mean[d];
            if mean <= x {
                if left.map_or(true, |l| mean > l.mean[d]) {
                    left = Some(basis);
                }
            } else if right.map_or(true, |r| mean < r.mean[d]) {
                right = Some(basis);
            }
        }

        let left_room = left.map(|l| x - l.mean[d] - 4.0 * l.sigma[d] - SIGMA_SAFETY_MARGIN);
        let right_room = right.map(|r| r.mean[d] - x - 4.0 * r.sigma[d] - SIGMA_SAFETY_MARGIN);
        let derived = match (left_room, right_room) {
            (Some(l), Some(r)) => l.min(r),
            (Some(room), None) | (None, Some(room)) => room,
            (None, None) => return self.config.initial_sigma,
        };

        if derived > self.config.max_sigma || derived <= 0.0 {
            self.config.initial_sigma
        } else {
            derived
        }
    }

    fn write_to(&self, writer: &mut dyn Write) -> Result<()> {
        writeln!(
            writer,
            "rbf {} {} {}",
            Action::action_space_size(),
            self.num_steps,
            self.dims
        )?;
        for action in Action::ALL {
            for step in 0..=self.num_steps {
                let list = self.list(step, action)?;
                write!(writer, "{} {} {}", action.to_index(), step, list.len())?;
                for basis in list.iter_sorted() {
                    write!(writer, " {:e}", basis.alpha)?;
                    for mean in &basis.mean {
                        write!(writer, " {mean:e}")?;
                    }
                    for sigma in &basis.sigma {
                        write!(writer, " {sigma:e}")?;
                    }
                }
                writeln!(writer)?;
            }
        }
        Ok(())
    }

    /// Reads the body following a `rbf <actions> <steps> <dims>` header
    pub(crate) fn read_from(
        header: &[&str],
        reader: &mut dyn BufRead,
        config: RbfConfig,
        learning_rate: f64,
    ) -> Result<Self> {
        let [actions, num_steps, dims] = header else {
            return Err(BoostError::persistence("rbf header needs actions, steps and dims"));
        };
        let actions: usize = parse(*actions)?;
        let num_steps: usize = parse(*num_steps)?;
        let dims: usize = parse(*dims)?;
        if actions != Action::action_space_size() || dims == 0 {
            return Err(BoostError::persistence(format!(
                "unsupported rbf table shape: {actions} actions, {dims} dims"
            )));
        }

        let mut q = Self::new(num_steps, dims, config, learning_rate);
        let per_basis = q.params_per_basis();
        let mut seen = vec![false; q.lists.len()];

        for line in reader.lines() {
            let line = line?;
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.is_empty() {
                continue;
            }
            if fields.len() < 3 {
                return Err(BoostError::persistence(format!("truncated rbf line '{line}'")));
            }
            let action = Action::from_index(parse(fields[0])?).ok_or_else(|| {
                BoostError::persistence(format!("unknown action index in '{line}'"))
            })?;
            let step: usize = parse(fields[1])?;
            let count: usize = parse(fields[2])?;
            let values = fields[3..]
                .iter()
                .map(|f| parse::<f64>(f))
                .collect::<Result<Vec<_>>>()?;
            if values.len() != count * per_basis {
                return Err(BoostError::persistence(format!(
                    "action {action} step {step}: {} values for {count} centers",
                    values.len()
                )));
            }

            let key = q
                .key(step, action)
                .map_err(|e| BoostError::persistence(e.to_string()))?;
            if std::mem::replace(&mut seen[key], true) {
                return Err(BoostError::persistence(format!(
                    "duplicate line for action {action} step {step}"
                )));
            }
            for chunk in values.chunks(per_basis) {
                let basis = Basis {
                    alpha: chunk[0],
                    mean: chunk[1..=dims].to_vec(),
                    sigma: chunk[dims + 1..].to_vec(),
                };
                if !basis.is_sound() {
                    return Err(BoostError::persistence(format!(
                        "action {action} step {step}: invalid center {basis:?}"
                    )));
                }
                q.lists[key].insert(basis);
            }
        }
        Ok(q)
    }
}

fn parse<T: std::str::FromStr>(field: &str) -> Result<T> {
    field
        .parse()
        .map_err(|_| BoostError::persistence(format!("cannot parse '{field}'")))
}

impl QFunction for RbfQFunction {
    fn value(&self, input: &Observation, action: Action) -> Result<f64> {
        let (step, x) = self.split(input)?;
        Ok(self.list(step, action)?.value(x, self.config.normalized))
    }

    fn parameter_count(&self, input: &Observation, action: Action) -> Result<usize> {
        let (step, _) = self.split(input)?;
        Ok(self.list(step, action)?.len() * self.params_per_basis())
    }

    fn gradient(&self, input: &Observation, action: Action) -> Result<Gradient> {
        let (step, x) = self.split(input)?;
        let list = self.list(step, action)?;
        let per_basis = self.params_per_basis();
        let mut gradient = vec![0.0; list.len() * per_basis];

        let (scale, value) = if self.config.normalized {
            let total = list.activation(x);
            if total <= 0.0 {
                return Ok(gradient);
            }
            (1.0 / total, list.value(x, true))
        } else {
            (1.0, 0.0)
        };

        for (slot, basis) in list.slots.iter().enumerate() {
            let phi = basis.activation(x) * scale;
            // Unnormalized: d/dmean = phi * alpha * (x - mean) / sigma^2.
            // Normalized: alpha is replaced by (alpha - value).
            let weight = basis.alpha - value;
            let g = &mut gradient[slot * per_basis..(slot + 1) * per_basis];
            g[0] = phi;
            for d in 0..self.dims {
                let diff = x[d] - basis.mean[d];
                let sigma = basis.sigma[d];
                g[1 + d] = phi * weight * diff / (sigma * sigma);
                g[1 + self.dims + d] = phi * weight * diff * diff / (sigma * sigma * sigma);
            }
        }
        Ok(gradient)
    }

    fn update_value(
        &mut self,
        input: &Observation,
        action: Action,
        td_error: f64,
        gradient: &[f64],
    ) -> Result<()> {
        let (step, _) = self.split(input)?;
        let key = self.key(step, action)?;
        let per_basis = self.params_per_basis();
        let dims = self.dims;
        let list = &mut self.lists[key];
        if gradient.len() > list.len() * per_basis {
            return Err(BoostError::domain(format!(
                "gradient has {} components for {} centers",
                gradient.len(),
                list.len()
            )));
        }

        let step_size = self.learning_rate * td_error;
        let alpha_step = step_size * self.config.alpha_rate;
        let mean_step = step_size * self.config.mean_rate;
        let sigma_step = step_size * self.config.sigma_rate;
        let mut moved = false;

        for (slot, g) in gradient.chunks(per_basis).enumerate() {
            let current = &list.slots[slot];
            let mut candidate = current.clone();
            candidate.alpha += alpha_step * g[0];
            if g.len() == per_basis {
                for d in 0..dims {
                    candidate.mean[d] += mean_step * g[1 + d];
                    candidate.sigma[d] += sigma_step * g[1 + dims + d];
                }
            }
            if !candidate.is_sound() {
                warn!(
                    %action,
                    step,
                    slot,
                    td_error,
                    ?candidate,
                    "Rejected degenerate RBF update"
                );
                self.anomalies += 1;
                continue;
            }
            moved |= candidate.mean != current.mean;
            list.slots[slot] = candidate;
        }

        if moved {
            list.resort();
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
        self.write_to(writer)
    }
}
