//! Actions available to the early-exit agent

use serde::{Deserialize, Serialize};

use crate::error::{BoostError, Result};

/// Decision taken before the next weak classifier in the ensemble
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Move past the next classifier without evaluating it
    Skip,
    /// Evaluate the next classifier and add its weighted vote to the margin
    Classify,
    /// Stop and predict from the current margin
    Terminate,
}

impl Action {
    /// All actions in index order
    pub const ALL: [Action; 3] = [Action::Skip, Action::Classify, Action::Terminate];

    /// Convert action to index for discrete action spaces
    pub fn to_index(self) -> usize {
        match self {
            Action::Skip => 0,
            Action::Classify => 1,
            Action::Terminate => 2,
        }
    }

    /// Create action from index
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Action::Skip),
            1 => Some(Action::Classify),
            2 => Some(Action::Terminate),
            _ => None,
        }
    }

    /// Number of discrete actions
    pub const fn action_space_size() -> usize {
        3
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Skip => write!(f, "skip"),
            Action::Classify => write!(f, "classify"),
            Action::Terminate => write!(f, "terminate"),
        }
    }
}

impl std::str::FromStr for Action {
    type Err = BoostError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" | "0" => Ok(Action::Skip),
            "classify" | "1" => Ok(Action::Classify),
            "terminate" | "2" => Ok(Action::Terminate),
            other => Err(BoostError::domain(format!("unknown action '{other}'"))),
        }
    }
}

/// The ordered set of actions an agent may choose from.
///
/// Order matters: greedy selection breaks ties in favour of the action
/// listed first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionSet(Vec<Action>);

impl ActionSet {
    pub fn new(actions: Vec<Action>) -> Result<Self> {
        let set = Self(actions);
        set.validate()?;
        Ok(set)
    }

    /// Checks the set is non-empty and free of duplicates
    pub fn validate(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(BoostError::config("action set must not be empty"));
        }
        for (i, action) in self.0.iter().enumerate() {
            if self.0[..i].contains(action) {
                return Err(BoostError::config(format!(
                    "action '{action}' listed more than once"
                )));
            }
        }
        Ok(())
    }

    pub fn contains(&self, action: Action) -> bool {
        self.0.contains(&action)
    }

    /// Returns an error when `action` is not part of this set
    pub fn ensure_contains(&self, action: Action) -> Result<()> {
        if self.contains(action) {
            Ok(())
        } else {
            Err(BoostError::domain(format!(
                "action '{action}' is outside the configured action set"
            )))
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Action> + '_ {
        self.0.iter().copied()
    }

    pub fn get(&self, position: usize) -> Option<Action> {
        self.0.get(position).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Action] {
        &self.0
    }
}

impl Default for ActionSet {
    fn default() -> Self {
        Self(Action::ALL.to_vec())
    }
}
