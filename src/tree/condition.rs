//! Edge conditions and their simplification along a leaf path.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{TreeError, TreeResult};
use crate::attribute::{AttributeType, canonical_name, format_timestamp_millis};
use crate::expr::is_valid_identifier;

/// Operator of a tree edge condition, spelled the way learners print it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl Operator {
    pub fn parse(text: &str) -> Option<Self> {
        Some(match text {
            "=" | "==" => Self::Eq,
            "!=" => Self::Ne,
            "<" => Self::Lt,
            ">" => Self::Gt,
            "<=" => Self::Le,
            ">=" => Self::Ge,
            _ => return None,
        })
    }

    /// Tree spelling (`=` for equality).
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
        }
    }

    /// Expression spelling (`==` for equality).
    pub fn expression_symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            other => other.symbol(),
        }
    }

    pub fn test(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            Self::Eq => ordering == Equal,
            Self::Ne => ordering != Equal,
            Self::Lt => ordering == Less,
            Self::Gt => ordering == Greater,
            Self::Le => ordering != Greater,
            Self::Ge => ordering != Less,
        }
    }
}

/// One test on a root-to-leaf path: `attribute OP value`.
///
/// `value` is kept as the learner printed it and typed through `kind`.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub attribute: String,
    pub kind: AttributeType,
    pub operator: Operator,
    pub value: String,
}

impl Condition {
    pub fn new(
        attribute: impl Into<String>,
        kind: AttributeType,
        operator: Operator,
        value: impl Into<String>,
    ) -> Self {
        Self {
            attribute: attribute.into(),
            kind,
            operator,
            value: value.into(),
        }
    }

    /// Build a condition from an edge label `OP VALUE`, split at the first space.
    pub fn from_edge(attribute: &str, kind: AttributeType, label: &str) -> TreeResult<Self> {
        let malformed = || TreeError::MalformedEdgeLabel {
            label: label.to_string(),
        };
        let (op, value) = label.trim_start().split_once(' ').ok_or_else(malformed)?;
        let operator = Operator::parse(op).ok_or_else(malformed)?;
        Ok(Self::new(attribute, kind, operator, value.trim()))
    }

    /// The threshold as a number. A leading `.` is accepted.
    pub fn numeric_value(&self) -> TreeResult<f64> {
        let text = self.value.trim();
        let normalized = match text.strip_prefix('.') {
            Some(rest) => format!("0.{rest}"),
            None => match text.strip_prefix("-.") {
                Some(rest) => format!("-0.{rest}"),
                None => text.to_string(),
            },
        };
        normalized
            .parse::<f64>()
            .map_err(|_| TreeError::InvalidNumericValue {
                attribute: self.attribute.clone(),
                value: self.value.clone(),
            })
    }

    /// Variable name used in expressions.
    pub fn variable(&self) -> String {
        if is_valid_identifier(&self.attribute) {
            self.attribute.clone()
        } else {
            match self.attribute.strip_suffix('\'') {
                Some(base) => format!("{}'", canonical_name(base)),
                None => canonical_name(&self.attribute),
            }
        }
    }

    /// Render the condition as guard expression text.
    pub fn to_expression_string(&self) -> TreeResult<String> {
        let variable = self.variable();
        let op = self.operator.expression_symbol();
        let value = match self.kind {
            AttributeType::Literal => quote(&self.value),
            AttributeType::Boolean => (self.value.trim() == "T").to_string(),
            AttributeType::Timestamp => {
                let millis = self.numeric_value()?;
                let text =
                    format_timestamp_millis(millis).ok_or_else(|| TreeError::InvalidNumericValue {
                        attribute: self.attribute.clone(),
                        value: self.value.clone(),
                    })?;
                quote(&text)
            }
            AttributeType::Discrete | AttributeType::Continuous => {
                self.numeric_value()?.to_string()
            }
        };
        Ok(format!("{variable} {op} {value}"))
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.attribute,
            self.operator.symbol(),
            self.value
        )
    }
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

// ---------------------------------------------------------------------------
// Interval folding
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
struct Bound {
    value: f64,
    inclusive: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Interval {
    lower: Option<Bound>,
    upper: Option<Bound>,
}

impl Interval {
    fn restrict_lower(&mut self, bound: Bound) {
        let tighter = match self.lower {
            None => true,
            Some(cur) => {
                bound.value > cur.value || (bound.value == cur.value && !bound.inclusive)
            }
        };
        if tighter {
            self.lower = Some(bound);
        }
    }

    fn restrict_upper(&mut self, bound: Bound) {
        let tighter = match self.upper {
            None => true,
            Some(cur) => {
                bound.value < cur.value || (bound.value == cur.value && !bound.inclusive)
            }
        };
        if tighter {
            self.upper = Some(bound);
        }
    }

    fn is_disjoint(&self) -> bool {
        matches!(
            (self.lower, self.upper),
            (Some(l), Some(u))
                if l.value > u.value || (l.value == u.value && !(l.inclusive && u.inclusive))
        )
    }
}

/// Fold inequalities on each numeric attribute into one interval.
///
/// Numeric attributes come first, in order of first appearance, each as an
/// optional lower bound followed by an optional upper bound. All other
/// conditions (including numeric `=`/`!=`) follow in their original order.
pub fn simplify(conditions: Vec<Condition>) -> TreeResult<Vec<Condition>> {
    let mut intervals: Vec<(String, AttributeType, Interval)> = Vec::new();
    let mut rest = Vec::new();

    for condition in conditions {
        let folds = condition.kind.is_numeric()
            && !matches!(condition.operator, Operator::Eq | Operator::Ne);
        if !folds {
            rest.push(condition);
            continue;
        }
        let value = condition.numeric_value()?;
        let slot = match intervals
            .iter()
            .position(|(name, _, _)| *name == condition.attribute)
        {
            Some(i) => i,
            None => {
                intervals.push((condition.attribute.clone(), condition.kind, Interval::default()));
                intervals.len() - 1
            }
        };
        let interval = &mut intervals[slot].2;
        match condition.operator {
            Operator::Gt => interval.restrict_lower(Bound {
                value,
                inclusive: false,
            }),
            Operator::Ge => interval.restrict_lower(Bound {
                value,
                inclusive: true,
            }),
            Operator::Lt => interval.restrict_upper(Bound {
                value,
                inclusive: false,
            }),
            Operator::Le => interval.restrict_upper(Bound {
                value,
                inclusive: true,
            }),
            Operator::Eq | Operator::Ne => {}
        }
    }

    let mut simplified = Vec::with_capacity(intervals.len() * 2 + rest.len());
    for (attribute, kind, interval) in intervals {
        if interval.is_disjoint() {
            return Err(TreeError::EmptyInterval { attribute });
        }
        if let Some(lower) = interval.lower {
            let op = if lower.inclusive {
                Operator::Ge
            } else {
                Operator::Gt
            };
            simplified.push(Condition::new(&attribute, kind, op, lower.value.to_string()));
        }
        if let Some(upper) = interval.upper {
            let op = if upper.inclusive {
                Operator::Le
            } else {
                Operator::Lt
            };
            simplified.push(Condition::new(&attribute, kind, op, upper.value.to_string()));
        }
    }
    simplified.extend(rest);
    Ok(simplified)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(attr: &str, op: Operator, v: &str) -> Condition {
        Condition::new(attr, AttributeType::Continuous, op, v)
    }

    fn rendered(conditions: &[Condition]) -> Vec<String> {
        conditions.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn folds_redundant_bounds() {
        let path = vec![
            num("x", Operator::Gt, "3"),
            num("x", Operator::Lt, "10"),
            num("x", Operator::Gt, "5"),
            num("x", Operator::Lt, "8"),
        ];
        assert_eq!(rendered(&simplify(path).unwrap()), vec!["x > 5", "x < 8"]);
    }

    #[test]
    fn folding_ignores_condition_order() {
        let conditions = [
            num("x", Operator::Gt, "5"),
            num("x", Operator::Gt, "2"),
            num("x", Operator::Le, "10"),
            num("x", Operator::Lt, "8"),
        ];
        for order in [[0, 1, 2, 3], [3, 2, 1, 0], [1, 3, 0, 2], [2, 0, 3, 1], [3, 1, 2, 0]] {
            let path = order.iter().map(|&i| conditions[i].clone()).collect();
            assert_eq!(
                rendered(&simplify(path).unwrap()),
                vec!["x > 5", "x < 8"],
                "order {order:?}"
            );
        }
    }

    #[test]
    fn open_bound_wins_on_ties() {
        let path = vec![num("x", Operator::Ge, "5"), num("x", Operator::Gt, "5")];
        assert_eq!(rendered(&simplify(path).unwrap()), vec!["x > 5"]);
        let path = vec![num("x", Operator::Lt, "5"), num("x", Operator::Le, "5")];
        assert_eq!(rendered(&simplify(path).unwrap()), vec!["x < 5"]);
    }

    #[test]
    fn numeric_conditions_precede_the_rest() {
        let path = vec![
            Condition::new("s", AttributeType::Literal, Operator::Eq, "gold"),
            num("y", Operator::Le, "2"),
            num("x", Operator::Gt, "1"),
            num("y", Operator::Gt, "0"),
            num("z", Operator::Eq, "4"),
        ];
        assert_eq!(
            rendered(&simplify(path).unwrap()),
            vec!["y > 0", "y <= 2", "x > 1", "s = gold", "z = 4"]
        );
    }

    #[test]
    fn disjoint_ranges_are_rejected() {
        let path = vec![num("x", Operator::Gt, "8"), num("x", Operator::Lt, "3")];
        assert!(matches!(
            simplify(path),
            Err(TreeError::EmptyInterval { attribute }) if attribute == "x"
        ));
    }

    #[test]
    fn touching_bounds_are_empty_unless_both_closed() {
        for (lower, upper) in [
            (Operator::Gt, Operator::Le),
            (Operator::Ge, Operator::Lt),
            (Operator::Gt, Operator::Lt),
        ] {
            let path = vec![num("x", lower, "5"), num("x", upper, "5")];
            assert!(
                matches!(simplify(path), Err(TreeError::EmptyInterval { .. })),
                "{lower:?} 5 with {upper:?} 5"
            );
        }
        let path = vec![num("x", Operator::Ge, "5"), num("x", Operator::Le, "5")];
        assert_eq!(rendered(&simplify(path).unwrap()), vec!["x >= 5", "x <= 5"]);
    }

    #[test]
    fn renders_typed_values() {
        let c = num("x", Operator::Le, ".5");
        assert_eq!(c.to_expression_string().unwrap(), "x <= 0.5");
        let c = Condition::new("s", AttributeType::Literal, Operator::Eq, "gold");
        assert_eq!(c.to_expression_string().unwrap(), "s == \"gold\"");
        let c = Condition::new("paid", AttributeType::Boolean, Operator::Eq, "T");
        assert_eq!(c.to_expression_string().unwrap(), "paid == true");
        let c = Condition::new("paid", AttributeType::Boolean, Operator::Ne, "F");
        assert_eq!(c.to_expression_string().unwrap(), "paid != false");
        let c = Condition::new(
            "at",
            AttributeType::Timestamp,
            Operator::Gt,
            "1700000000000",
        );
        assert_eq!(
            c.to_expression_string().unwrap(),
            "at > \"Tue Nov 14 22:13:20 UTC 2023\""
        );
        let c = num("order total", Operator::Gt, "3");
        assert_eq!(c.to_expression_string().unwrap(), "order_u0020_total > 3");
    }

    #[test]
    fn parses_edge_labels() {
        let c = Condition::from_edge("x", AttributeType::Discrete, "<= 4").unwrap();
        assert_eq!(c.operator, Operator::Le);
        assert_eq!(c.value, "4");
        let c = Condition::from_edge("s", AttributeType::Literal, " = pay now").unwrap();
        assert_eq!(c.value, "pay now");
        assert!(Condition::from_edge("x", AttributeType::Discrete, "<=4").is_err());
        assert!(Condition::from_edge("x", AttributeType::Discrete, "~ 4").is_err());
    }
}
