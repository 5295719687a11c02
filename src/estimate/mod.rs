//! Guard estimation engines.
//!
//! Every engine turns the training instances of one decision point into a
//! guard per outgoing branch:
//!
//! - [`BasicEstimator`]: one multi-class tree, guards from its leaves.
//! - [`DiscriminatingEstimator`]: one binary tree per branch.
//! - [`LocalRefinementEstimator`]: the basic tree, plus secondary trees grown
//!   inside impure leaves so that overlapping guards can emerge.
//! - [`PairwiseEstimator`]: the basic tree, plus one tree per pair of merged
//!   branches, keeping whichever guards score better.

pub mod basic;
pub mod builder;
pub mod discriminating;
pub mod local;
pub mod pairwise;

use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::attribute::{AttributeSchema, Instance};
use crate::class::{ClassDomain, ClassId};
use crate::error::DiscoveryResult;
use crate::expr::Expr;
use crate::learn::{Dataset, TreeLearner, TreeModel, TreeParams};
use crate::tree::ClassificationTree;

pub use basic::BasicEstimator;
pub use builder::{apply_no_leaf_policy, build_guards};
pub use discriminating::DiscriminatingEstimator;
pub use local::{LocalRefinementConfig, LocalRefinementEstimator};
pub use pairwise::{Partition, PairwiseEstimator};

/// A guard and its quality score (an F-measure in [0, 1] when known).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionEstimation {
    pub expression: Expr,
    pub quality: Option<f64>,
}

impl FunctionEstimation {
    pub fn new(expression: Expr, quality: Option<f64>) -> Self {
        Self {
            expression,
            quality,
        }
    }
}

impl fmt::Display for FunctionEstimation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.quality {
            Some(q) => write!(f, "{} (F={q:.4})", self.expression),
            None => write!(f, "{}", self.expression),
        }
    }
}

/// Guards keyed by class.
pub type GuardMap<K> = BTreeMap<K, FunctionEstimation>;

/// Guard given to a branch that no tree leaf predicts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoLeafPolicy {
    #[default]
    TreatAsTrue,
    TreatAsFalse,
}

impl NoLeafPolicy {
    pub fn constant(self) -> Expr {
        match self {
            Self::TreatAsTrue => Expr::true_instance(),
            Self::TreatAsFalse => Expr::false_instance(),
        }
    }
}

/// Harmonic mean of the positive scores, or `None` if no score is positive.
pub fn aggregate_quality(scores: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (count, inverse_sum) = scores
        .into_iter()
        .filter(|&f| f > 0.0)
        .fold((0usize, 0.0), |(n, sum), f| (n + 1, sum + 1.0 / f));
    (count > 0).then(|| count as f64 / inverse_sum)
}

// ---------------------------------------------------------------------------
// Engine interface
// ---------------------------------------------------------------------------

/// Training input of one decision point.
#[derive(Debug, Clone)]
pub struct DecisionProblem<'a> {
    pub decision_point: &'a str,
    pub schema: &'a AttributeSchema,
    /// Outgoing branches, in declaration order.
    pub classes: &'a [ClassId],
    pub instances: &'a [Instance],
    pub params: TreeParams,
}

/// Output of an engine for one decision point.
#[derive(Debug, Clone)]
pub struct Estimation {
    pub guards: GuardMap<ClassId>,
    /// Aggregate quality; `None` when the engine does not score its guards.
    pub quality: Option<f64>,
    /// Printable description of the trained tree.
    pub summary: String,
}

/// A guard estimation engine.
pub trait GuardEstimator: Send + Sync {
    fn name(&self) -> &'static str;

    fn estimate(&self, problem: &DecisionProblem<'_>) -> DiscoveryResult<Estimation>;
}

/// A trained tree together with the guards read off its leaves.
pub(crate) struct TreeFit<K> {
    pub domain: ClassDomain<K>,
    pub dataset: Dataset,
    pub model: Box<dyn TreeModel>,
    pub tree: ClassificationTree,
    pub guards: GuardMap<K>,
}

impl<K> TreeFit<K>
where
    K: Clone + Eq + Hash + Ord + fmt::Display,
{
    /// F-measure of every class of the domain, in domain order.
    pub fn class_scores(&self) -> Vec<f64> {
        (0..self.domain.len())
            .map(|i| self.model.evaluation().f_measure(i))
            .collect()
    }
}

/// Train one tree over `domain` and derive its guards.
///
/// Every class gets a guard (missing ones through `policy`) scored with the
/// tree's F-measure for that class.
pub(crate) fn fit_tree<K, T>(
    learner: &dyn TreeLearner,
    problem: &DecisionProblem<'_>,
    domain: ClassDomain<K>,
    target: T,
    policy: NoLeafPolicy,
) -> DiscoveryResult<TreeFit<K>>
where
    K: Clone + Eq + Hash + Ord + fmt::Display,
    T: Fn(&Instance) -> K,
{
    let dataset = Dataset::from_instances(problem.schema, problem.instances, &domain, target)?;
    let model = learner.train(&dataset, &problem.params)?;
    let tree = ClassificationTree::parse(&model.graph(), problem.schema)?;
    let leaves = tree.leaves()?;

    let mut guards = build_guards(&leaves, |label| domain.resolve(label).cloned())?;
    apply_no_leaf_policy(&mut guards, domain.classes().iter().cloned(), policy);
    for (index, class) in domain.classes().iter().enumerate() {
        if let Some(estimation) = guards.get_mut(class) {
            estimation.quality = Some(model.evaluation().f_measure(index));
        }
    }

    Ok(TreeFit {
        domain,
        dataset,
        model,
        tree,
        guards,
    })
}
