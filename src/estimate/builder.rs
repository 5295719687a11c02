//! Per-class guard construction from tree leaves.

use std::collections::BTreeMap;

use super::{FunctionEstimation, GuardMap, NoLeafPolicy};
use crate::expr::{Expr, MAX_NESTING_DEPTH};
use crate::tree::{LeafDescriptor, TreeError, TreeResult};

/// OR together the path conjunctions of every leaf, grouped by predicted class.
///
/// Leaves that cover no instances are skipped, and so is the root leaf of a
/// tree without splits, since its path is empty. `resolve` maps a leaf label
/// back to its class. Qualities are left unset.
pub fn build_guards<'a, K, F>(
    leaves: impl IntoIterator<Item = &'a LeafDescriptor>,
    resolve: F,
) -> TreeResult<GuardMap<K>>
where
    K: Ord + Clone,
    F: Fn(&str) -> Option<K>,
{
    let mut guards: GuardMap<K> = BTreeMap::new();
    let mut depths: BTreeMap<K, usize> = BTreeMap::new();

    for leaf in leaves {
        if leaf.instance_count() <= 0.0 {
            continue;
        }
        let class = resolve(leaf.class()).ok_or_else(|| TreeError::UnknownClass {
            label: leaf.class().to_string(),
        })?;
        let Some(expression) = leaf.expression()? else {
            continue;
        };
        let leaf_depth = expression.nesting_depth();

        let (combined, depth) = match guards.remove(&class) {
            Some(existing) => {
                let depth = 1 + depths.get(&class).copied().unwrap_or(0).max(leaf_depth);
                (Expr::or(existing.expression, expression), depth)
            }
            None => (expression, leaf_depth),
        };
        if depth > MAX_NESTING_DEPTH {
            return Err(TreeError::NestingTooDeep {
                depth,
                limit: MAX_NESTING_DEPTH,
            });
        }
        depths.insert(class.clone(), depth);
        guards.insert(class, FunctionEstimation::new(combined, None));
    }

    Ok(guards)
}

/// Give every class without a guard the policy's constant.
pub fn apply_no_leaf_policy<K: Ord>(
    guards: &mut GuardMap<K>,
    classes: impl IntoIterator<Item = K>,
    policy: NoLeafPolicy,
) {
    for class in classes {
        guards
            .entry(class)
            .or_insert_with(|| FunctionEstimation::new(policy.constant(), Some(0.0)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeType;
    use crate::tree::{Condition, Operator};

    fn leaf(class: &str, conditions: &[(&str, Operator, &str)], count: f64) -> LeafDescriptor {
        let conditions = conditions
            .iter()
            .map(|&(a, op, v)| Condition::new(a, AttributeType::Continuous, op, v))
            .collect();
        LeafDescriptor::new(class, conditions, count, 0.0).unwrap()
    }

    fn resolve(label: &str) -> Option<String> {
        ["a", "b", "c"]
            .contains(&label)
            .then(|| label.to_string())
    }

    #[test]
    fn ors_leaves_of_the_same_class() {
        let leaves = vec![
            leaf("a", &[("x", Operator::Le, "1")], 4.0),
            leaf("b", &[("x", Operator::Gt, "1"), ("y", Operator::Le, "2")], 3.0),
            leaf("a", &[("x", Operator::Gt, "1"), ("y", Operator::Gt, "2")], 5.0),
            leaf("c", &[("x", Operator::Gt, "9")], 0.0),
        ];
        let guards = build_guards(&leaves, resolve).unwrap();
        assert_eq!(guards.len(), 2);
        assert_eq!(
            guards["a"].expression.to_string(),
            "x <= 1 || x > 1 && y > 2"
        );
        assert_eq!(guards["b"].expression.to_string(), "x > 1 && y <= 2");
        assert!(guards["a"].quality.is_none());
    }

    #[test]
    fn root_leaf_yields_no_guard_until_policy() {
        let leaves = vec![leaf("a", &[], 10.0)];
        let mut guards = build_guards(&leaves, resolve).unwrap();
        assert!(guards.is_empty());
        apply_no_leaf_policy(
            &mut guards,
            ["a", "b"].map(String::from),
            NoLeafPolicy::TreatAsFalse,
        );
        assert!(guards["a"].expression.is_const(false));
        assert!(guards["b"].expression.is_const(false));
        assert_eq!(guards["b"].quality, Some(0.0));
    }

    #[test]
    fn unknown_class_label_is_an_error() {
        let leaves = vec![leaf("z", &[("x", Operator::Le, "1")], 1.0)];
        assert!(matches!(
            build_guards(&leaves, resolve),
            Err(TreeError::UnknownClass { label }) if label == "z"
        ));
    }

    #[test]
    fn deep_disjunctions_are_rejected() {
        let leaves: Vec<_> = (0..MAX_NESTING_DEPTH + 2)
            .map(|i| leaf("a", &[("x", Operator::Gt, i.to_string().as_str())], 1.0))
            .collect();
        assert!(matches!(
            build_guards(&leaves, resolve),
            Err(TreeError::NestingTooDeep { .. })
        ));
    }
}
