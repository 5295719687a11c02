//! Rich diagnostic error types for guard discovery.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]`
//! derives; [`DiscoveryError`] wraps them and adds the context of the
//! decision point or partition that failed.

use miette::Diagnostic;
use thiserror::Error;

use crate::config::ConfigError;
use crate::expr::ExprError;
use crate::learn::LearnError;
use crate::tree::TreeError;

/// Top-level error type for rule discovery.
#[derive(Debug, Error, Diagnostic)]
pub enum DiscoveryError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Expression(#[from] ExprError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Learn(#[from] LearnError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error("rule discovery failed at decision point '{decision_point}'")]
    #[diagnostic(
        code(guard::discovery::decision_point),
        help("The underlying error names the attribute, label or value at fault.")
    )]
    DecisionPoint {
        decision_point: String,
        #[source]
        source: Box<DiscoveryError>,
    },

    #[error(
        "guard at decision point '{decision_point}' nests {depth} levels deep (limit {limit})"
    )]
    #[diagnostic(
        code(guard::discovery::nesting),
        help(
            "The tree has too many leaves per branch. Raise min_percentage_objects_on_leaf \
             or keep pruning enabled."
        )
    )]
    NestingTooDeep {
        decision_point: String,
        depth: usize,
        limit: usize,
    },

    #[error("evaluating partition {partition} failed")]
    #[diagnostic(code(guard::discovery::partition))]
    PartitionFailed {
        partition: String,
        #[source]
        source: Box<DiscoveryError>,
    },

    #[error("failed to build worker pool: {message}")]
    #[diagnostic(
        code(guard::discovery::pool),
        help("Lower the `threads` setting or leave it unset to use one thread per core.")
    )]
    Pool { message: String },
}

impl DiscoveryError {
    /// Attach decision point context. Nesting failures keep their own variant.
    pub fn at_decision_point(self, decision_point: &str) -> Self {
        match self {
            Self::Tree(TreeError::NestingTooDeep { depth, limit }) => Self::NestingTooDeep {
                decision_point: decision_point.to_string(),
                depth,
                limit,
            },
            Self::Expression(ExprError::TooDeep { limit })
            | Self::Tree(TreeError::Expression(ExprError::TooDeep { limit })) => Self::NestingTooDeep {
                decision_point: decision_point.to_string(),
                depth: limit + 1,
                limit,
            },
            Self::PartitionFailed { source, .. } if source.is_nesting() => {
                (*source).at_decision_point(decision_point)
            }
            other => Self::DecisionPoint {
                decision_point: decision_point.to_string(),
                source: Box::new(other),
            },
        }
    }

    fn is_nesting(&self) -> bool {
        match self {
            Self::Tree(TreeError::NestingTooDeep { .. })
            | Self::Expression(ExprError::TooDeep { .. })
            | Self::Tree(TreeError::Expression(ExprError::TooDeep { .. })) => true,
            Self::PartitionFailed { source, .. } => source.is_nesting(),
            _ => false,
        }
    }
}

/// Convenience result alias.
pub type DiscoveryResult<T> = std::result::Result<T, DiscoveryError>;
