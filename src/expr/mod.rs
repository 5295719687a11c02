//! Guard expression language.
//!
//! A small boolean language over attribute variables:
//!
//! ```text
//! expr    := or
//! or      := and ( "||" and )*
//! and     := unary ( "&&" unary )*
//! unary   := "!" unary | primary
//! primary := "(" expr ")" | "true" | "false" | IDENT OP literal
//! OP      := "==" | "!=" | "<" | "<=" | ">" | ">="
//! literal := NUMBER | STRING | "true" | "false"
//! ```
//!
//! Identifiers may carry a trailing `'` to refer to the value an attribute
//! takes after the decision. The [`Display`](std::fmt::Display) form of an
//! [`Expr`] parses back to an equal expression.

pub mod error;
pub mod eval;
pub mod lexer;
pub mod parser;

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use error::{ExprError, ExprResult};
pub use eval::Bindings;
pub use lexer::is_valid_identifier;
pub use parser::parse;

/// Deepest operator nesting accepted by the parser and the guard builder.
pub const MAX_NESTING_DEPTH: usize = 1024;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    /// Apply the operator to the ordering of `left` relative to `right`.
    pub fn test(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
        }
    }
}

/// A literal on the right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Str(String),
    Bool(bool),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Str(s) => {
                f.write_str("\"")?;
                for c in s.chars() {
                    if c == '"' || c == '\\' {
                        f.write_str("\\")?;
                    }
                    write!(f, "{c}")?;
                }
                f.write_str("\"")
            }
        }
    }
}

/// Boolean guard expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(bool),
    Compare {
        variable: String,
        op: CmpOp,
        value: Literal,
    },
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn true_instance() -> Self {
        Self::Const(true)
    }

    pub fn false_instance() -> Self {
        Self::Const(false)
    }

    pub fn compare(variable: impl Into<String>, op: CmpOp, value: Literal) -> Self {
        Self::Compare {
            variable: variable.into(),
            op,
            value,
        }
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Self::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Self::Or(Box::new(left), Box::new(right))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: Expr) -> Self {
        Self::Not(Box::new(inner))
    }

    pub fn is_const(&self, value: bool) -> bool {
        matches!(self, Self::Const(v) if *v == value)
    }

    /// Every variable name referenced by the expression.
    pub fn variables(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                Self::Const(_) => {}
                Self::Compare { variable, .. } => {
                    names.insert(variable.clone());
                }
                Self::Not(inner) => stack.push(inner),
                Self::And(l, r) | Self::Or(l, r) => {
                    stack.push(l);
                    stack.push(r);
                }
            }
        }
        names
    }

    /// Number of operator levels on the longest root-to-atom path.
    pub fn nesting_depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 0usize)];
        while let Some((node, depth)) = stack.pop() {
            match node {
                Self::Const(_) | Self::Compare { .. } => deepest = deepest.max(depth),
                Self::Not(inner) => stack.push((inner, depth + 1)),
                Self::And(l, r) | Self::Or(l, r) => {
                    stack.push((l, depth + 1));
                    stack.push((r, depth + 1));
                }
            }
        }
        deepest
    }

    fn precedence(&self) -> u8 {
        match self {
            Self::Or(..) => 1,
            Self::And(..) => 2,
            Self::Const(_) | Self::Compare { .. } | Self::Not(_) => 3,
        }
    }

    fn fmt_child(&self, child: &Expr, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if child.precedence() < self.precedence() {
            write!(f, "({child})")
        } else {
            write!(f, "{child}")
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const(v) => write!(f, "{v}"),
            Self::Compare {
                variable,
                op,
                value,
            } => write!(f, "{variable} {} {value}", op.symbol()),
            Self::Not(inner) => write!(f, "!({inner})"),
            Self::And(l, r) => {
                self.fmt_child(l, f)?;
                f.write_str(" && ")?;
                self.fmt_child(r, f)
            }
            Self::Or(l, r) => {
                self.fmt_child(l, f)?;
                f.write_str(" || ")?;
                self.fmt_child(r, f)
            }
        }
    }
}

impl std::str::FromStr for Expr {
    type Err = ExprError;

    fn from_str(text: &str) -> ExprResult<Self> {
        parse(text)
    }
}

impl Serialize for Expr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Expr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmp(var: &str, op: CmpOp, v: f64) -> Expr {
        Expr::compare(var, op, Literal::Number(v))
    }

    #[test]
    fn display_parenthesizes_by_precedence() {
        let e = Expr::and(
            Expr::or(cmp("x", CmpOp::Gt, 1.0), cmp("y", CmpOp::Lt, 2.0)),
            Expr::not(Expr::compare("s", CmpOp::Eq, Literal::Str("a\"b".into()))),
        );
        assert_eq!(e.to_string(), "(x > 1 || y < 2) && !(s == \"a\\\"b\")");
        assert_eq!(parse(&e.to_string()).unwrap(), e);
    }

    #[test]
    fn variables_and_depth() {
        let e = Expr::or(
            Expr::and(cmp("x", CmpOp::Gt, 5.0), cmp("x", CmpOp::Lt, 8.0)),
            cmp("y'", CmpOp::Ge, 0.5),
        );
        let vars: Vec<_> = e.variables().into_iter().collect();
        assert_eq!(vars, vec!["x".to_string(), "y'".to_string()]);
        assert_eq!(e.nesting_depth(), 2);
        assert_eq!(Expr::true_instance().nesting_depth(), 0);
    }

    #[test]
    fn serde_uses_the_textual_form() {
        let e = cmp("amount", CmpOp::Le, 500.0);
        let json = serde_json::to_string(&e).unwrap();
        assert_eq!(json, "\"amount <= 500\"");
        let back: Expr = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn cmp_op_test_matches_ordering() {
        assert!(CmpOp::Le.test(Ordering::Equal));
        assert!(CmpOp::Le.test(Ordering::Less));
        assert!(!CmpOp::Lt.test(Ordering::Equal));
        assert!(CmpOp::Ne.test(Ordering::Greater));
    }
}
