//! Error types for tree parsing and leaf extraction.

use miette::Diagnostic;
use thiserror::Error;

use crate::expr::ExprError;

#[derive(Debug, Error, Diagnostic)]
pub enum TreeError {
    #[error("malformed tree graph at line {line}: {message}")]
    #[diagnostic(
        code(guard::tree::graph),
        help("Tree graphs use the `digraph` format: `N0 [label=\"...\"]` and `N0->N1 [label=\"...\"]`.")
    )]
    Graph { line: usize, message: String },

    #[error("tree graph has no nodes")]
    #[diagnostic(code(guard::tree::empty))]
    EmptyGraph,

    #[error("malformed leaf label: '{label}'")]
    #[diagnostic(
        code(guard::tree::leaf_label),
        help("Leaf labels read `CLASS (COUNT)` or `CLASS (COUNT/WRONG)`.")
    )]
    MalformedLeafLabel { label: String },

    #[error("malformed edge label: '{label}'")]
    #[diagnostic(
        code(guard::tree::edge_label),
        help("Edge labels read `OP VALUE`, e.g. `<= 4.5` or `= gold`.")
    )]
    MalformedEdgeLabel { label: String },

    #[error("tree tests attribute '{attribute}' which is not in the schema")]
    #[diagnostic(code(guard::tree::unknown_attribute))]
    UnknownAttribute { attribute: String },

    #[error("leaf predicts '{label}' which is not a known class")]
    #[diagnostic(code(guard::tree::unknown_class))]
    UnknownClass { label: String },

    #[error("condition on '{attribute}' has non-numeric value '{value}'")]
    #[diagnostic(code(guard::tree::numeric_value))]
    InvalidNumericValue { attribute: String, value: String },

    #[error("conditions on '{attribute}' describe an empty interval")]
    #[diagnostic(
        code(guard::tree::empty_interval),
        help("A tree path never tests disjoint ranges of one attribute; the tree text is inconsistent.")
    )]
    EmptyInterval { attribute: String },

    #[error("guard expression nests {depth} levels deep (limit {limit})")]
    #[diagnostic(
        code(guard::tree::nesting),
        help("Raise the minimum leaf size so the tree has fewer leaves per class.")
    )]
    NestingTooDeep { depth: usize, limit: usize },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Expression(#[from] ExprError),
}

/// Result type for tree operations.
pub type TreeResult<T> = std::result::Result<T, TreeError>;
