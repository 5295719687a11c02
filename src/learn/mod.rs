//! Classification tree learning.
//!
//! The guard engines only see the [`TreeLearner`] and [`TreeModel`] traits: a
//! learner trains on a [`Dataset`] and yields a model that can print itself as
//! a tree graph, classify encoded rows, and report its per-class evaluation.
//! [`C45Learner`] is the bundled implementation.

pub mod c45;
pub mod dataset;
pub mod error;
pub mod evaluation;
mod stats;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use c45::C45Learner;
pub use dataset::{Dataset, EncodedAttribute, Encoding, Row};
pub use error::{LearnError, LearnResult};
pub use evaluation::Evaluation;

/// Training parameters shared by every tree the engines build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    /// Binary `= v` / `!= v` splits on nominal attributes (default: false).
    pub binary_split: bool,
    /// Skip pessimistic pruning (default: false).
    pub unpruned: bool,
    /// Pruning confidence in (0, 0.5] (default: 0.25).
    pub confidence_factor: f64,
    /// Minimum instance weight per leaf (default: 2).
    pub min_num_obj: usize,
    /// Leaves with more than this many plus one misclassified instances are
    /// refined by the local engine (default: 3).
    pub num_fold_error_pruning: usize,
    /// Evaluate by cross-validation instead of on the training set (default: false).
    pub cross_validate: bool,
    /// Number of cross-validation folds (default: 5).
    pub cross_validation_folds: usize,
    /// Seed for the cross-validation shuffle (default: 1).
    pub seed: u64,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            binary_split: false,
            unpruned: false,
            confidence_factor: 0.25,
            min_num_obj: 2,
            num_fold_error_pruning: 3,
            cross_validate: false,
            cross_validation_folds: 5,
            seed: 1,
        }
    }
}

impl TreeParams {
    pub fn validate(&self) -> LearnResult<()> {
        if !(self.confidence_factor > 0.0 && self.confidence_factor <= 0.5) {
            return Err(LearnError::InvalidParams {
                message: format!(
                    "confidence factor {} is outside (0, 0.5]",
                    self.confidence_factor
                ),
            });
        }
        if self.min_num_obj == 0 {
            return Err(LearnError::InvalidParams {
                message: "minimum leaf size must be at least 1".into(),
            });
        }
        if self.cross_validate && self.cross_validation_folds < 2 {
            return Err(LearnError::InvalidParams {
                message: format!(
                    "cross-validation needs at least 2 folds, got {}",
                    self.cross_validation_folds
                ),
            });
        }
        Ok(())
    }
}

/// A trained classification tree.
pub trait TreeModel: Send + Sync + fmt::Display {
    /// The tree in `digraph` text form (see [`crate::tree::TreeGraph`]).
    fn graph(&self) -> String;

    /// Predicted class index for an encoded row.
    fn classify(&self, values: &[Option<f64>]) -> usize;

    /// Per-class evaluation gathered while training.
    fn evaluation(&self) -> &Evaluation;

    fn num_leaves(&self) -> usize;
}

/// Something that trains classification trees.
pub trait TreeLearner: Send + Sync {
    fn train(&self, data: &Dataset, params: &TreeParams) -> LearnResult<Box<dyn TreeModel>>;
}
