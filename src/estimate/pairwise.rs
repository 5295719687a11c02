//! Pairwise overlap refinement.
//!
//! For every unordered pair of branches a tree is trained with the pair
//! merged into one class. The merged class's guard is offered to both
//! members, each scored against the original branches, and kept wherever it
//! beats the current guard.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rayon::ThreadPool;
use rayon::prelude::*;
use tracing::{debug, info};

use super::{
    DecisionProblem, Estimation, FunctionEstimation, GuardEstimator, GuardMap, NoLeafPolicy,
    TreeFit, aggregate_quality, fit_tree,
};
use crate::class::{ClassDomain, ClassId, TargetClass};
use crate::error::{DiscoveryError, DiscoveryResult};
use crate::learn::TreeLearner;

// ---------------------------------------------------------------------------
// Partitions
// ---------------------------------------------------------------------------

/// A split of the branches into one merged pair and singletons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    combined: (ClassId, ClassId),
    others: Vec<ClassId>,
}

impl Partition {
    /// All pairs `(i, j)` with `i < j`, in lexicographic index order.
    /// Repeated classes count once, at their first position.
    pub fn enumerate(classes: &[ClassId]) -> Vec<Partition> {
        let classes: Vec<&ClassId> = classes
            .iter()
            .enumerate()
            .filter(|&(i, c)| !classes[..i].contains(c))
            .map(|(_, c)| c)
            .collect();
        let mut partitions = Vec::new();
        for i in 0..classes.len() {
            for j in i + 1..classes.len() {
                let others = classes
                    .iter()
                    .enumerate()
                    .filter(|&(k, _)| k != i && k != j)
                    .map(|(_, &c)| c.clone())
                    .collect();
                partitions.push(Partition {
                    combined: (classes[i].clone(), classes[j].clone()),
                    others,
                });
            }
        }
        partitions
    }

    pub fn combined(&self) -> (&ClassId, &ClassId) {
        (&self.combined.0, &self.combined.1)
    }

    /// The training classes: the merged pair first, then the singletons.
    pub fn subsets(&self) -> Vec<TargetClass> {
        let mut subsets = vec![TargetClass::combined(
            self.combined.0.clone(),
            self.combined.1.clone(),
        )];
        subsets.extend(self.others.iter().cloned().map(TargetClass::single));
        subsets
    }

    /// The training class an instance of `class` belongs to.
    pub fn target_of(&self, class: &ClassId) -> TargetClass {
        if *class == self.combined.0 || *class == self.combined.1 {
            TargetClass::combined(self.combined.0.clone(), self.combined.1.clone())
        } else {
            TargetClass::single(class.clone())
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.subsets().iter().map(|s| s.to_string()).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Confusion {
    tp: f64,
    fp: f64,
    fn_: f64,
}

impl Confusion {
    /// F-measure where an empty denominator counts as perfect precision or recall.
    fn f_score(self) -> f64 {
        let precision = if self.fp == 0.0 {
            1.0
        } else {
            self.tp / (self.tp + self.fp)
        };
        let recall = if self.fn_ == 0.0 {
            1.0
        } else {
            self.tp / (self.tp + self.fn_)
        };
        if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        }
    }
}

/// Score a partition tree against the original branches of its instances.
fn rescore(fit: &TreeFit<TargetClass>, problem: &DecisionProblem<'_>) -> HashMap<ClassId, f64> {
    let mut counts: HashMap<&ClassId, Confusion> = problem
        .classes
        .iter()
        .map(|c| (c, Confusion::default()))
        .collect();

    for (instance, row) in problem.instances.iter().zip(fit.dataset.rows()) {
        let prior = &instance.target;
        let weight = row.weight;
        let Some(classified) = fit.domain.class(fit.model.classify(&row.values)) else {
            continue;
        };
        match classified {
            TargetClass::Single(c) if c == prior => {
                counts.entry(prior).or_default().tp += weight;
            }
            TargetClass::Combined(..) if classified.contains(prior) => {
                counts.entry(prior).or_default().tp += weight;
            }
            TargetClass::Combined(a, b) => {
                counts.entry(a).or_default().fp += weight;
                counts.entry(b).or_default().fp += weight;
                counts.entry(prior).or_default().fn_ += weight;
            }
            TargetClass::Single(c) => {
                counts.entry(c).or_default().fp += weight;
                counts.entry(prior).or_default().fn_ += weight;
            }
        }
    }

    counts
        .into_iter()
        .map(|(class, confusion)| (class.clone(), confusion.f_score()))
        .collect()
}

struct PartitionOutcome {
    guards: GuardMap<ClassId>,
    quality: Option<f64>,
    num_leaves: usize,
}

// ---------------------------------------------------------------------------
// Estimator
// ---------------------------------------------------------------------------

pub struct PairwiseEstimator {
    learner: Arc<dyn TreeLearner>,
    policy: NoLeafPolicy,
    mix_estimations: bool,
    pool: Option<Arc<ThreadPool>>,
}

impl PairwiseEstimator {
    pub fn new(learner: Arc<dyn TreeLearner>, policy: NoLeafPolicy, mix_estimations: bool) -> Self {
        Self {
            learner,
            policy,
            mix_estimations,
            pool: None,
        }
    }

    /// Evaluate partitions on `pool` instead of the global rayon pool.
    pub fn with_pool(mut self, pool: Arc<ThreadPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    fn evaluate(
        &self,
        partition: &Partition,
        problem: &DecisionProblem<'_>,
    ) -> DiscoveryResult<PartitionOutcome> {
        let fit = fit_tree(
            self.learner.as_ref(),
            problem,
            ClassDomain::new(partition.subsets()),
            |instance| partition.target_of(&instance.target),
            self.policy,
        )?;
        let scores = rescore(&fit, problem);

        let mut guards = GuardMap::new();
        for (target, estimation) in fit.guards {
            for member in target.members() {
                let score = scores.get(member).copied();
                guards.insert(
                    member.clone(),
                    FunctionEstimation::new(estimation.expression.clone(), score),
                );
            }
        }
        let quality =
            aggregate_quality(problem.classes.iter().filter_map(|c| scores.get(c).copied()));
        debug!(
            partition = %partition,
            leaves = fit.model.num_leaves(),
            quality = ?quality,
            "partition evaluated"
        );
        Ok(PartitionOutcome {
            guards,
            quality,
            num_leaves: fit.model.num_leaves(),
        })
    }
}

/// Whether `candidate` should replace `current` for one branch.
fn improves(current: Option<&FunctionEstimation>, candidate: &FunctionEstimation) -> bool {
    let Some(new) = candidate.quality.filter(|&q| q > 0.0) else {
        return false;
    };
    match current.and_then(|c| c.quality) {
        None => true,
        Some(old) => old < new,
    }
}

impl GuardEstimator for PairwiseEstimator {
    fn name(&self) -> &'static str {
        "pairwise"
    }

    fn estimate(&self, problem: &DecisionProblem<'_>) -> DiscoveryResult<Estimation> {
        let base = fit_tree(
            self.learner.as_ref(),
            problem,
            ClassDomain::new(problem.classes.iter().cloned()),
            |instance| instance.target.clone(),
            self.policy,
        )?;
        let mut quality = aggregate_quality(base.class_scores());
        let summary = base.model.to_string();
        let mut guards = base.guards;

        // With two branches the only partition is the basic tree again.
        let partitions = Partition::enumerate(problem.classes);
        if partitions.len() <= 1 {
            return Ok(Estimation {
                guards,
                quality,
                summary,
            });
        }

        let run = || {
            partitions
                .par_iter()
                .map(|partition| self.evaluate(partition, problem))
                .collect::<Vec<_>>()
        };
        let outcomes = match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        };

        for (partition, outcome) in partitions.iter().zip(outcomes) {
            let outcome = outcome.map_err(|e| DiscoveryError::PartitionFailed {
                partition: partition.to_string(),
                source: Box::new(e),
            })?;
            if self.mix_estimations {
                for (class, candidate) in outcome.guards {
                    if improves(guards.get(&class), &candidate) {
                        info!(
                            partition = %partition,
                            class = %class,
                            guard = %candidate,
                            "adopting partition guard"
                        );
                        guards.insert(class, candidate);
                    }
                }
            } else if outcome.num_leaves > 1
                && outcome.quality.is_some_and(|q| quality.is_none_or(|cur| q > cur))
            {
                info!(partition = %partition, quality = ?outcome.quality, "adopting partition");
                guards = outcome.guards;
                quality = outcome.quality;
            }
        }

        if self.mix_estimations {
            quality = aggregate_quality(guards.values().filter_map(|g| g.quality));
        }
        info!(
            decision_point = problem.decision_point,
            partitions = partitions.len(),
            quality = ?quality,
            "pairwise refinement finished"
        );
        Ok(Estimation {
            guards,
            quality,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<ClassId> {
        names.iter().map(|n| ClassId::new(*n)).collect()
    }

    #[test]
    fn enumerates_pairs_in_order() {
        let partitions = Partition::enumerate(&ids(&["a", "b", "c", "d"]));
        let shown: Vec<String> = partitions.iter().map(ToString::to_string).collect();
        assert_eq!(
            shown,
            vec![
                "{[a, b], c, d}",
                "{[a, c], b, d}",
                "{[a, d], b, c}",
                "{[b, c], a, d}",
                "{[b, d], a, c}",
                "{[c, d], a, b}",
            ]
        );
        assert_eq!(Partition::enumerate(&ids(&["a"])).len(), 0);
    }

    #[test]
    fn repeated_classes_are_never_paired_with_themselves() {
        let partitions = Partition::enumerate(&ids(&["a", "b", "a", "c", "b"]));
        let shown: Vec<String> = partitions.iter().map(ToString::to_string).collect();
        assert_eq!(shown, vec!["{[a, b], c}", "{[a, c], b}", "{[b, c], a}"]);
        assert_eq!(Partition::enumerate(&ids(&["a", "b", "b"])).len(), 1);
    }

    #[test]
    fn targets_map_members_to_the_merged_class() {
        let partitions = Partition::enumerate(&ids(&["a", "b", "c"]));
        let partition = &partitions[1];
        assert_eq!(
            partition.target_of(&ClassId::new("c")),
            TargetClass::combined(ClassId::new("c"), ClassId::new("a"))
        );
        assert_eq!(
            partition.target_of(&ClassId::new("b")),
            TargetClass::single(ClassId::new("b"))
        );
    }

    #[test]
    fn f_score_defaults() {
        let empty = Confusion::default();
        assert_eq!(empty.f_score(), 1.0);
        let missed = Confusion {
            tp: 0.0,
            fp: 0.0,
            fn_: 4.0,
        };
        assert_eq!(missed.f_score(), 0.0);
        let mixed = Confusion {
            tp: 35.0,
            fp: 15.0,
            fn_: 0.0,
        };
        assert!((mixed.f_score() - 14.0 / 17.0).abs() < 1e-12);
    }

    #[test]
    fn improvement_needs_a_positive_better_score() {
        let guard = |q: Option<f64>| FunctionEstimation::new(crate::expr::Expr::true_instance(), q);
        assert!(improves(None, &guard(Some(0.4))));
        assert!(improves(Some(&guard(None)), &guard(Some(0.4))));
        assert!(improves(Some(&guard(Some(0.3))), &guard(Some(0.4))));
        assert!(!improves(Some(&guard(Some(0.4))), &guard(Some(0.4))));
        assert!(!improves(None, &guard(Some(0.0))));
        assert!(!improves(None, &guard(None)));
    }
}
