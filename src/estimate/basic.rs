//! Single multi-class tree.

use std::sync::Arc;

use tracing::debug;

use super::{
    DecisionProblem, Estimation, GuardEstimator, NoLeafPolicy, aggregate_quality, fit_tree,
};
use crate::class::ClassDomain;
use crate::error::DiscoveryResult;
use crate::learn::TreeLearner;

pub struct BasicEstimator {
    learner: Arc<dyn TreeLearner>,
    policy: NoLeafPolicy,
}

impl BasicEstimator {
    pub fn new(learner: Arc<dyn TreeLearner>, policy: NoLeafPolicy) -> Self {
        Self { learner, policy }
    }
}

impl GuardEstimator for BasicEstimator {
    fn name(&self) -> &'static str {
        "basic"
    }

    fn estimate(&self, problem: &DecisionProblem<'_>) -> DiscoveryResult<Estimation> {
        let domain = ClassDomain::new(problem.classes.iter().cloned());
        let fit = fit_tree(
            self.learner.as_ref(),
            problem,
            domain,
            |instance| instance.target.clone(),
            self.policy,
        )?;
        let quality = aggregate_quality(fit.class_scores());
        debug!(
            decision_point = problem.decision_point,
            leaves = fit.model.num_leaves(),
            quality = ?quality,
            "basic tree fitted"
        );
        Ok(Estimation {
            guards: fit.guards,
            quality,
            summary: fit.model.to_string(),
        })
    }
}
