//! Evaluation of guard expressions against variable bindings.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use super::{CmpOp, Expr, Literal};
use crate::attribute::{Instance, Value, original_name, parse_timestamp_literal};

/// Source of variable values for evaluation.
pub trait Bindings {
    fn lookup(&self, variable: &str) -> Option<&Value>;
}

impl Bindings for HashMap<String, Value> {
    fn lookup(&self, variable: &str) -> Option<&Value> {
        self.get(variable)
    }
}

impl Bindings for BTreeMap<String, Value> {
    fn lookup(&self, variable: &str) -> Option<&Value> {
        self.get(variable)
    }
}

/// Instances resolve escaped identifiers back to their raw attribute names.
impl Bindings for Instance {
    fn lookup(&self, variable: &str) -> Option<&Value> {
        self.values.get(variable).or_else(|| {
            let (base, primed) = match variable.strip_suffix('\'') {
                Some(base) => (base, true),
                None => (variable, false),
            };
            let mut raw = original_name(base)?;
            if primed {
                raw.push('\'');
            }
            self.values.get(&raw)
        })
    }
}

impl Expr {
    /// Evaluate under `bindings`. A comparison on an unbound variable, or on a
    /// value whose type does not fit the literal, is false.
    pub fn is_true<B: Bindings + ?Sized>(&self, bindings: &B) -> bool {
        match self {
            Self::Const(v) => *v,
            Self::Compare {
                variable,
                op,
                value,
            } => bindings
                .lookup(variable)
                .is_some_and(|bound| compare(bound, *op, value)),
            Self::Not(inner) => !inner.is_true(bindings),
            Self::And(l, r) => l.is_true(bindings) && r.is_true(bindings),
            Self::Or(l, r) => l.is_true(bindings) || r.is_true(bindings),
        }
    }
}

fn compare(bound: &Value, op: CmpOp, literal: &Literal) -> bool {
    let ordering = match (bound, literal) {
        (Value::Discrete(_) | Value::Continuous(_) | Value::Timestamp(_), Literal::Number(n)) => {
            bound.as_f64().and_then(|v| v.partial_cmp(n))
        }
        (Value::Timestamp(t), Literal::Str(s)) => {
            parse_timestamp_literal(s).map(|lit| t.timestamp_millis().cmp(&lit.timestamp_millis()))
        }
        (Value::Literal(v), Literal::Str(s)) => Some(v.as_str().cmp(s.as_str())),
        (Value::Boolean(v), Literal::Bool(b)) => match op {
            CmpOp::Eq | CmpOp::Ne => Some(v.cmp(b)),
            _ => None,
        },
        _ => None,
    };
    ordering.is_some_and(|o: Ordering| op.test(o))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse;
    use chrono::TimeZone;
    use chrono::Utc;

    fn bindings(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn numeric_comparisons() {
        let b = bindings(&[("x", Value::Continuous(6.5)), ("n", Value::Discrete(3))]);
        assert!(parse("x > 5 && x < 8").unwrap().is_true(&b));
        assert!(parse("n <= 3").unwrap().is_true(&b));
        assert!(!parse("n != 3").unwrap().is_true(&b));
    }

    #[test]
    fn missing_variable_makes_comparison_false() {
        let b = bindings(&[]);
        assert!(!parse("x > 5").unwrap().is_true(&b));
        assert!(parse("!(x > 5)").unwrap().is_true(&b));
        assert!(parse("x > 5 || true").unwrap().is_true(&b));
    }

    #[test]
    fn literal_boolean_and_timestamp_comparisons() {
        let t = Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap();
        let b = bindings(&[
            ("s", Value::from("gold")),
            ("paid", Value::Boolean(true)),
            ("at", Value::Timestamp(t)),
        ]);
        assert!(parse("s == \"gold\"").unwrap().is_true(&b));
        assert!(parse("s != \"silver\"").unwrap().is_true(&b));
        assert!(parse("paid == true").unwrap().is_true(&b));
        assert!(!parse("paid > false").unwrap().is_true(&b));
        assert!(
            parse("at <= \"Tue Nov 14 22:13:20 UTC 2023\"")
                .unwrap()
                .is_true(&b)
        );
        assert!(
            !parse("at > \"Tue Nov 14 22:13:20 UTC 2023\"")
                .unwrap()
                .is_true(&b)
        );
        assert!(!parse("s > 3").unwrap().is_true(&b));
    }

    #[test]
    fn timestamps_compare_within_the_second() {
        let t = Utc.timestamp_millis_opt(1_700_000_000_400).unwrap();
        let b = bindings(&[("at", Value::Timestamp(t))]);
        assert!(
            parse("at > \"Tue Nov 14 22:13:20 UTC 2023\"")
                .unwrap()
                .is_true(&b)
        );
        assert!(
            parse("at > \"Tue Nov 14 22:13:20.250 UTC 2023\"")
                .unwrap()
                .is_true(&b)
        );
        assert!(
            !parse("at <= \"Tue Nov 14 22:13:20.399 UTC 2023\"")
                .unwrap()
                .is_true(&b)
        );
        assert!(
            parse("at <= \"Tue Nov 14 22:13:20.400 UTC 2023\"")
                .unwrap()
                .is_true(&b)
        );
    }

    #[test]
    fn instances_resolve_escaped_names() {
        let instance = Instance::new("a")
            .with_value("order total", 120.0)
            .with_value("order total'", 80.0);
        assert!(parse("order_u0020_total > 100").unwrap().is_true(&instance));
        assert!(parse("order_u0020_total' < 100").unwrap().is_true(&instance));
    }
}
