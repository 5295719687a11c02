//! Rule discovery configuration, loadable from TOML.

use std::path::Path;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::attribute::Instance;
use crate::estimate::NoLeafPolicy;
use crate::learn::TreeParams;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config file: {path}")]
    #[diagnostic(
        code(guard::config::read),
        help("Check that the file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config file: {path}")]
    #[diagnostic(code(guard::config::write))]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    #[diagnostic(
        code(guard::config::parse),
        help("The config file must be valid TOML with the fields of DiscoveryConfig.")
    )]
    Parse { path: String, message: String },

    #[error("invalid config value for '{field}': {message}")]
    #[diagnostic(code(guard::config::invalid))]
    Invalid { field: &'static str, message: String },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Which guard engine runs at every decision point.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// One multi-class tree.
    #[default]
    Basic,
    /// One binary tree per branch.
    Discriminating,
    /// Basic tree, then secondary trees inside impure leaves.
    Local,
    /// Basic tree, then one tree per merged pair of branches.
    Pairwise,
}

impl StrategyKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Discriminating => "discriminating",
            Self::Local => "local",
            Self::Pairwise => "pairwise",
        }
    }
}

/// Options of a rule discovery run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Guard engine (default: basic).
    pub strategy: StrategyKind,
    /// Collapse identical observations into one weighted instance (default: true).
    pub use_weights: bool,
    /// Also offer post-decision values as `name'` attributes (default: false).
    pub mine_prime_guards: bool,
    /// Only take an observation when the decision point was the previous activity (default: false).
    pub mine_directly_following_classes: bool,
    /// Binary splits on literal attributes (default: false).
    pub binary_split: bool,
    /// Evaluate trees by cross-validation (default: false).
    pub cross_validate: bool,
    /// Skip pruning (default: false).
    pub unpruned: bool,
    /// Pruning confidence in (0, 0.5] (default: 0.25).
    pub confidence_threshold: f64,
    /// Minimum leaf size as a fraction of the training weight; 0 means the floor of 2 (default: 0.0).
    pub min_percentage_objects_on_leaf: f64,
    /// Misclassification threshold for leaf refinement (default: 3).
    pub num_fold_error_pruning: usize,
    /// Cross-validation folds (default: 5).
    pub cross_validation_folds: usize,
    /// Seed for the cross-validation shuffle (default: 1).
    pub seed: u64,
    /// Guard for a branch no leaf predicts (default: treat_as_true).
    pub no_leaf_policy: NoLeafPolicy,
    /// Scale the minimum leaf size of secondary trees to their subset (default: true).
    pub reduce_min_leafs: bool,
    /// Largest error ratio of a single-leaf secondary tree that is still merged (default: 0.05).
    pub merge_wrong_instance_ratio: f64,
    /// Merge a single-leaf secondary tree whenever its class already has a leaf (default: false).
    pub always_merge_existing_leafs: bool,
    /// Improve guards branch by branch instead of adopting whole partitions (default: true).
    pub mix_estimations: bool,
    /// Worker threads; `None` uses one per core.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Basic,
            use_weights: true,
            mine_prime_guards: false,
            mine_directly_following_classes: false,
            binary_split: false,
            cross_validate: false,
            unpruned: false,
            confidence_threshold: 0.25,
            min_percentage_objects_on_leaf: 0.0,
            num_fold_error_pruning: 3,
            cross_validation_folds: 5,
            seed: 1,
            no_leaf_policy: NoLeafPolicy::TreatAsTrue,
            reduce_min_leafs: true,
            merge_wrong_instance_ratio: 0.05,
            always_merge_existing_leafs: false,
            mix_estimations: true,
            threads: None,
        }
    }
}

impl DiscoveryConfig {
    /// Load from a TOML file. Missing fields take their defaults.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    /// Parse TOML text. Missing fields take their defaults.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Self::parse(content, "<inline>")
    }

    fn parse(content: &str, path: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.confidence_threshold > 0.0 && self.confidence_threshold <= 0.5) {
            return Err(ConfigError::Invalid {
                field: "confidence_threshold",
                message: format!("{} is outside (0, 0.5]", self.confidence_threshold),
            });
        }
        if !(0.0..=1.0).contains(&self.min_percentage_objects_on_leaf) {
            return Err(ConfigError::Invalid {
                field: "min_percentage_objects_on_leaf",
                message: format!("{} is outside [0, 1]", self.min_percentage_objects_on_leaf),
            });
        }
        if !(0.0..=1.0).contains(&self.merge_wrong_instance_ratio) {
            return Err(ConfigError::Invalid {
                field: "merge_wrong_instance_ratio",
                message: format!("{} is outside [0, 1]", self.merge_wrong_instance_ratio),
            });
        }
        if self.cross_validation_folds < 2 {
            return Err(ConfigError::Invalid {
                field: "cross_validation_folds",
                message: format!("need at least 2 folds, got {}", self.cross_validation_folds),
            });
        }
        if self.threads == Some(0) {
            return Err(ConfigError::Invalid {
                field: "threads",
                message: "thread count must be positive".into(),
            });
        }
        Ok(())
    }

    /// Minimum leaf size for a training set:
    /// `max(2, floor(min_percentage * weight))`, where weight is the summed
    /// instance weight when weighting is on and the instance count otherwise.
    pub fn min_num_obj_for(&self, instances: &[Instance]) -> usize {
        let weight = if self.use_weights {
            instances.iter().map(|i| i.weight).sum::<f64>()
        } else {
            instances.len() as f64
        };
        ((self.min_percentage_objects_on_leaf * weight).floor() as usize).max(2)
    }

    /// Tree parameters for a training set of `instances`.
    pub fn tree_params(&self, instances: &[Instance]) -> TreeParams {
        TreeParams {
            binary_split: self.binary_split,
            unpruned: self.unpruned,
            confidence_factor: self.confidence_threshold,
            min_num_obj: self.min_num_obj_for(instances),
            num_fold_error_pruning: self.num_fold_error_pruning,
            cross_validate: self.cross_validate,
            cross_validation_folds: self.cross_validation_folds,
            seed: self.seed,
        }
    }
}
