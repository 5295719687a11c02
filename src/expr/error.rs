//! Error types for the guard expression language.

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ExprError {
    #[error("unexpected character '{found}' at offset {offset}")]
    #[diagnostic(
        code(guard::expr::lex),
        help("Expressions use identifiers, literals, comparison operators, '!', '&&', '||' and parentheses.")
    )]
    UnexpectedChar { found: char, offset: usize },

    #[error("unterminated string literal starting at offset {offset}")]
    #[diagnostic(
        code(guard::expr::unterminated_string),
        help("Close the literal with '\"'. Embedded quotes are written as \\\".")
    )]
    UnterminatedString { offset: usize },

    #[error("invalid number '{text}' at offset {offset}")]
    #[diagnostic(code(guard::expr::number))]
    InvalidNumber { text: String, offset: usize },

    #[error("unexpected {found} at offset {offset}, expected {expected}")]
    #[diagnostic(
        code(guard::expr::syntax),
        help("A comparison is written as `variable OP literal`, e.g. `amount > 500`.")
    )]
    UnexpectedToken {
        found: String,
        expected: &'static str,
        offset: usize,
    },

    #[error("unexpected end of expression, expected {expected}")]
    #[diagnostic(code(guard::expr::eof))]
    UnexpectedEnd { expected: &'static str },

    #[error("expression nests deeper than {limit} levels")]
    #[diagnostic(
        code(guard::expr::too_deep),
        help("Guards of this size usually come from trees with thousands of leaves; raise the minimum leaf size.")
    )]
    TooDeep { limit: usize },
}

/// Result type for expression operations.
pub type ExprResult<T> = std::result::Result<T, ExprError>;
