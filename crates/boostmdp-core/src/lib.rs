//! boostmdp Core - Shared types for learning early-exit boosting policies
//!
//! This crate provides the vocabulary used across all boostmdp components:
//! the action set, the configuration tree and the error types.

// Clippy pedantic allows - these are intentional design choices
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]

pub mod action;
pub mod config;
pub mod error;
pub mod types;

pub use action::{Action, ActionSet};
pub use config::{
    BoostConfig, LearningConfig, RbfConfig, RepresentationConfig, RepresentationKind,
    RewardConfig, RewardMode, Schedule, TrainingConfig,
};
pub use error::{BoostError, Result};
pub use types::*;
