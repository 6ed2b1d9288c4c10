//! Weak-hypothesis votes consumed by the environment
//!
//! The learner never trains or serializes hypotheses. It only needs, for a
//! (hypothesis, example) pair, the per-class signed vote and the hypothesis
//! confidence weight, so that it can accumulate `sum(weight * vote)`.

use std::path::Path;

use ndarray::{s, Array1, Array3, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::info;

use boostmdp_core::{BoostError, Result};

/// Per-class vote of one hypothesis on one example
#[derive(Debug, Clone, Copy)]
pub struct WeakVote<'a> {
    pub values: ArrayView1<'a, f64>,
    pub weight: f64,
}

/// Contract of the external weak learner
pub trait WeakHypotheses: Send + Sync {
    fn num_hypotheses(&self) -> usize;

    fn num_examples(&self) -> usize;

    fn num_classes(&self) -> usize;

    /// Label (class index) of an example
    fn label(&self, example: usize) -> Result<usize>;

    /// Vote and confidence weight of `hypothesis` on `example`
    fn vote(&self, hypothesis: usize, example: usize) -> Result<WeakVote<'_>>;

    /// Sum of absolute hypothesis weights, used to rescale margins
    fn total_weight(&self) -> f64;
}

/// On-disk layout of a vote table
#[derive(Debug, Clone, Serialize, Deserialize)]
struct VoteFile {
    weights: Vec<f64>,
    labels: Vec<usize>,
    /// votes[hypothesis][example][class]
    votes: Vec<Vec<Vec<f64>>>,
}

/// Pre-computed votes of a trained ensemble
#[derive(Debug, Clone)]
pub struct VoteTable {
    votes: Array3<f64>,
    weights: Array1<f64>,
    labels: Vec<usize>,
    total_weight: f64,
}

impl VoteTable {
    /// `votes` is indexed `[hypothesis, example, class]`
    pub fn new(weights: Vec<f64>, labels: Vec<usize>, votes: Array3<f64>) -> Result<Self> {
        let (hypotheses, examples, classes) = votes.dim();
        if weights.len() != hypotheses {
            return Err(BoostError::persistence(format!(
                "{} weights for {hypotheses} hypotheses",
                weights.len()
            )));
        }
        if labels.len() != examples {
            return Err(BoostError::persistence(format!(
                "{} labels for {examples} examples",
                labels.len()
            )));
        }
        if classes < 2 {
            return Err(BoostError::persistence("at least two classes are required"));
        }
        if let Some(bad) = labels.iter().find(|&&l| l >= classes) {
            return Err(BoostError::persistence(format!(
                "label {bad} out of range for {classes} classes"
            )));
        }
        if weights.iter().chain(votes.iter()).any(|v| !v.is_finite()) {
            return Err(BoostError::persistence("weights and votes must be finite"));
        }

        let total_weight = weights.iter().map(|w| w.abs()).sum();
        Ok(Self {
            votes,
            weights: Array1::from(weights),
            labels,
            total_weight,
        })
    }

    /// Binary table from scalar votes: `votes[h][e]` becomes `[v, -v]`.
    ///
    /// Labels are class indices, 0 for the positive class.
    pub fn binary(weights: Vec<f64>, labels: Vec<usize>, votes: &[Vec<f64>]) -> Result<Self> {
        let hypotheses = votes.len();
        let examples = labels.len();
        let mut table = Array3::zeros((hypotheses, examples, 2));
        for (h, row) in votes.iter().enumerate() {
            if row.len() != examples {
                return Err(BoostError::persistence(format!(
                    "hypothesis {h} votes on {} examples, expected {examples}",
                    row.len()
                )));
            }
            for (e, v) in row.iter().enumerate() {
                table[[h, e, 0]] = *v;
                table[[h, e, 1]] = -*v;
            }
        }
        Self::new(weights, labels, table)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: VoteFile = serde_json::from_str(json)?;
        let hypotheses = file.votes.len();
        let examples = file.labels.len();
        let classes = file
            .votes
            .first()
            .and_then(|h| h.first())
            .map_or(0, Vec::len);

        let mut flat = Vec::with_capacity(hypotheses * examples * classes);
        for (h, per_example) in file.votes.iter().enumerate() {
            if per_example.len() != examples {
                return Err(BoostError::persistence(format!(
                    "hypothesis {h} votes on {} examples, expected {examples}",
                    per_example.len()
                )));
            }
            for (e, per_class) in per_example.iter().enumerate() {
                if per_class.len() != classes {
                    return Err(BoostError::persistence(format!(
                        "hypothesis {h}, example {e}: {} class votes, expected {classes}",
                        per_class.len()
                    )));
                }
                flat.extend_from_slice(per_class);
            }
        }
        let votes = Array3::from_shape_vec((hypotheses, examples, classes), flat)
            .map_err(|e| BoostError::persistence(format!("vote table shape: {e}")))?;
        Self::new(file.weights, file.labels, votes)
    }

    /// Loads a JSON vote file; failures here are fatal at startup
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let table = Self::from_json_str(&json)?;
        info!(
            path = %path.display(),
            hypotheses = table.num_hypotheses(),
            examples = table.num_examples(),
            classes = table.num_classes(),
            "Loaded vote table"
        );
        Ok(table)
    }

    pub fn to_json_string(&self) -> Result<String> {
        let (hypotheses, examples, _) = self.votes.dim();
        let votes = (0..hypotheses)
            .map(|h| {
                (0..examples)
                    .map(|e| self.votes.slice(s![h, e, ..]).to_vec())
                    .collect()
            })
            .collect();
        let file = VoteFile {
            weights: self.weights.to_vec(),
            labels: self.labels.clone(),
            votes,
        };
        Ok(serde_json::to_string(&file)?)
    }
}

impl WeakHypotheses for VoteTable {
    fn num_hypotheses(&self) -> usize {
        self.votes.dim().0
    }

    fn num_examples(&self) -> usize {
        self.votes.dim().1
    }

    fn num_classes(&self) -> usize {
        self.votes.dim().2
    }

    fn label(&self, example: usize) -> Result<usize> {
        self.labels.get(example).copied().ok_or_else(|| {
            BoostError::domain(format!(
                "example {example} out of range ({} examples)",
                self.labels.len()
            ))
        })
    }

    fn vote(&self, hypothesis: usize, example: usize) -> Result<WeakVote<'_>> {
        let (hypotheses, examples, _) = self.votes.dim();
        if hypothesis >= hypotheses || example >= examples {
            return Err(BoostError::domain(format!(
                "vote ({hypothesis}, {example}) out of range ({hypotheses} x {examples})"
            )));
        }
        Ok(WeakVote {
            values: self.votes.slice(s![hypothesis, example, ..]),
            weight: self.weights[hypothesis],
        })
    }

    fn total_weight(&self) -> f64 {
        self.total_weight
    }
}
