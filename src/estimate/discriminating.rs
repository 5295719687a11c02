//! One binary tree per branch: "this branch" against "any other branch".

use std::sync::Arc;

use tracing::debug;

use super::{DecisionProblem, Estimation, GuardEstimator, GuardMap, NoLeafPolicy, fit_tree};
use crate::class::ClassDomain;
use crate::error::DiscoveryResult;
use crate::learn::TreeLearner;

pub struct DiscriminatingEstimator {
    learner: Arc<dyn TreeLearner>,
    policy: NoLeafPolicy,
}

impl DiscriminatingEstimator {
    pub fn new(learner: Arc<dyn TreeLearner>, policy: NoLeafPolicy) -> Self {
        Self { learner, policy }
    }
}

impl GuardEstimator for DiscriminatingEstimator {
    fn name(&self) -> &'static str {
        "discriminating"
    }

    /// Each branch's guard is the `true` guard of its own binary tree. The
    /// per-tree qualities are kept; no aggregate is computed.
    fn estimate(&self, problem: &DecisionProblem<'_>) -> DiscoveryResult<Estimation> {
        let mut guards = GuardMap::new();
        let mut summary = String::new();
        for branch in problem.classes {
            let fit = fit_tree(
                self.learner.as_ref(),
                problem,
                ClassDomain::new([true, false]),
                |instance| instance.target == *branch,
                self.policy,
            )?;
            summary.push_str(&format!("=== {branch} ===\n{}\n", fit.model));
            let mut binary = fit.guards;
            if let Some(estimation) = binary.remove(&true) {
                debug!(branch = %branch, guard = %estimation, "binary tree fitted");
                guards.insert(branch.clone(), estimation);
            }
        }
        Ok(Estimation {
            guards,
            quality: None,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{AttributeSchema, AttributeType, Instance};
    use crate::class::ClassId;
    use crate::learn::{C45Learner, TreeParams};

    #[test]
    fn every_branch_gets_its_own_guard() {
        let schema = AttributeSchema::new().with_attribute("x", AttributeType::Discrete);
        let mut instances = Vec::new();
        for x in 0..30i64 {
            let class = match x {
                0..=9 => "a",
                10..=19 => "b",
                _ => "c",
            };
            instances.push(Instance::new(class).with_value("x", x));
        }
        let classes = ["a", "b", "c"].map(ClassId::new);
        let problem = DecisionProblem {
            decision_point: "p",
            schema: &schema,
            classes: &classes,
            instances: &instances,
            params: TreeParams::default(),
        };
        let estimator =
            DiscriminatingEstimator::new(Arc::new(C45Learner), NoLeafPolicy::TreatAsTrue);
        let estimation = estimator.estimate(&problem).unwrap();
        assert_eq!(estimation.quality, None);
        assert_eq!(estimation.guards.len(), 3);
        assert_eq!(
            estimation.guards[&ClassId::new("a")].expression.to_string(),
            "x <= 9"
        );
        assert_eq!(
            estimation.guards[&ClassId::new("c")].expression.to_string(),
            "x > 19"
        );
        let b = &estimation.guards[&ClassId::new("b")].expression;
        for x in 0..30i64 {
            let instance = Instance::new("b").with_value("x", x);
            assert_eq!(b.is_true(&instance), (10..=19).contains(&x), "x = {x}");
        }
    }
}
