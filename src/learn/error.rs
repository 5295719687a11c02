//! Error types for dataset encoding and tree training.

use miette::Diagnostic;
use thiserror::Error;

use crate::attribute::AttributeType;

#[derive(Debug, Error, Diagnostic)]
pub enum LearnError {
    #[error("cannot train on an empty dataset")]
    #[diagnostic(
        code(guard::learn::empty),
        help("The decision point produced no training instances; check the branch activities.")
    )]
    EmptyDataset,

    #[error("training needs at least one class")]
    #[diagnostic(code(guard::learn::no_classes))]
    NoClasses,

    #[error("instance targets class '{class}' which is not in the class domain")]
    #[diagnostic(code(guard::learn::unknown_target))]
    UnknownTarget { class: String },

    #[error("attribute '{attribute}' is declared {expected} but holds a {found} value")]
    #[diagnostic(
        code(guard::learn::unsupported_value),
        help("Every value of an attribute must have the type the schema declares for it.")
    )]
    UnsupportedValue {
        attribute: String,
        expected: AttributeType,
        found: AttributeType,
    },

    #[error("value '{value}' of attribute '{attribute}' is outside its literal domain")]
    #[diagnostic(code(guard::learn::unknown_literal))]
    UnknownLiteral { attribute: String, value: String },

    #[error("invalid tree parameter: {message}")]
    #[diagnostic(code(guard::learn::params))]
    InvalidParams { message: String },
}

/// Result type for learning operations.
pub type LearnResult<T> = std::result::Result<T, LearnError>;
