//! Local overlap refinement.
//!
//! After the basic tree is trained, every leaf that misclassifies enough
//! weight gets a secondary tree trained only on the instances of that leaf
//! that belong to other branches. The secondary leaves, prefixed with the
//! original leaf's path, become additional disjuncts of their classes'
//! guards, so guards of different branches may overlap.

use std::sync::Arc;

use tracing::{debug, info};

use super::{
    DecisionProblem, Estimation, GuardEstimator, NoLeafPolicy, TreeFit, apply_no_leaf_policy,
    build_guards, fit_tree,
};
use crate::attribute::Instance;
use crate::class::{ClassDomain, ClassId};
use crate::error::DiscoveryResult;
use crate::expr::{Bindings, Expr};
use crate::learn::{Dataset, Encoding, Row, TreeLearner, TreeParams};
use crate::tree::{ClassificationTree, Condition, LeafDescriptor, TreeError, TreeResult};

/// Tuning of the local refinement engine.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalRefinementConfig {
    /// Scale the minimum leaf size of a secondary tree to its subset (default: true).
    pub reduce_min_leafs: bool,
    /// Largest error ratio of a single-leaf secondary tree that is merged (default: 0.05).
    pub merge_wrong_instance_ratio: f64,
    /// Also merge a single-leaf secondary tree whose class already has a leaf (default: false).
    pub always_merge_existing_leafs: bool,
    pub no_leaf_policy: NoLeafPolicy,
}

impl Default for LocalRefinementConfig {
    fn default() -> Self {
        Self {
            reduce_min_leafs: true,
            merge_wrong_instance_ratio: 0.05,
            always_merge_existing_leafs: false,
            no_leaf_policy: NoLeafPolicy::TreatAsTrue,
        }
    }
}

pub struct LocalRefinementEstimator {
    learner: Arc<dyn TreeLearner>,
    config: LocalRefinementConfig,
}

impl LocalRefinementEstimator {
    pub fn new(learner: Arc<dyn TreeLearner>, config: LocalRefinementConfig) -> Self {
        Self { learner, config }
    }

    /// Replacement leaves for `leaf`, or `None` to keep it as is.
    fn refine(
        &self,
        leaf: &LeafDescriptor,
        ranked: &[LeafDescriptor],
        fit: &TreeFit<ClassId>,
        problem: &DecisionProblem<'_>,
    ) -> DiscoveryResult<Option<Vec<LeafDescriptor>>> {
        let Some(predicted) = fit.domain.index_of_label(leaf.class()) else {
            return Err(TreeError::UnknownClass {
                label: leaf.class().to_string(),
            }
            .into());
        };

        let mut rows = Vec::new();
        for row in fit.dataset.rows() {
            if row.class != predicted && satisfies_all(&fit.dataset, row, leaf.conditions())? {
                rows.push(row.clone());
            }
        }
        if rows.is_empty() {
            return Ok(None);
        }
        let subset = fit.dataset.with_rows(rows);
        let params = self.secondary_params(&problem.params, &fit.dataset, &subset);
        debug!(
            leaf = %leaf,
            subset = subset.len(),
            min_num_obj = params.min_num_obj,
            "training secondary tree"
        );

        let model = self.learner.train(&subset, &params)?;
        let secondary = ClassificationTree::parse(&model.graph(), problem.schema)?;
        let remainder = LeafDescriptor::new(
            leaf.class(),
            leaf.conditions().to_vec(),
            leaf.instance_count() - leaf.misclassified(),
            0.0,
        )?;

        if secondary.depth() > 0 {
            let mut replacement = vec![remainder];
            for sub in secondary.leaves()? {
                let merged = sub.with_prefix(leaf.conditions())?;
                if merged.instance_count() > 0.0 {
                    replacement.push(merged);
                }
            }
            return Ok(Some(replacement));
        }

        let root = secondary.leaves()?.into_iter().next();
        let Some(root) = root else {
            return Ok(None);
        };
        if root.instance_count() > problem.params.min_num_obj as f64
            && self.merges_single_leaf(&root, ranked)
        {
            let merged = LeafDescriptor::new(
                root.class(),
                leaf.conditions().to_vec(),
                root.instance_count(),
                root.misclassified(),
            )?;
            return Ok(Some(vec![remainder, merged]));
        }
        Ok(None)
    }

    fn merges_single_leaf(&self, root: &LeafDescriptor, ranked: &[LeafDescriptor]) -> bool {
        let ratio = root.misclassified() / root.instance_count();
        ratio < self.config.merge_wrong_instance_ratio
            || (self.config.always_merge_existing_leafs
                && ranked.iter().any(|l| l.class() == root.class()))
    }

    /// Parameters of a secondary tree. The minimum leaf size shrinks in
    /// proportion to the subset when `reduce_min_leafs` is set, never below 2.
    /// A subset too small for the fold count is not cross-validated.
    fn secondary_params(&self, base: &TreeParams, full: &Dataset, subset: &Dataset) -> TreeParams {
        let mut params = base.clone();
        if self.config.reduce_min_leafs {
            let scaled = if subset.has_weights() {
                base.min_num_obj as f64 / full.total_weight() * subset.total_weight()
            } else {
                base.min_num_obj as f64 / full.len() as f64 * subset.len() as f64
            };
            params.min_num_obj = (scaled.ceil() as usize).max(2);
        }
        if params.cross_validate && params.min_num_obj < params.cross_validation_folds {
            params.cross_validate = false;
        }
        params
    }
}

/// Whether `row` passes every condition. A missing value fails.
fn satisfies_all(data: &Dataset, row: &Row, conditions: &[Condition]) -> TreeResult<bool> {
    for condition in conditions {
        let Some(index) = data.attribute_index(&condition.attribute) else {
            return Err(TreeError::UnknownAttribute {
                attribute: condition.attribute.clone(),
            });
        };
        let Some(value) = row.values[index] else {
            return Ok(false);
        };
        let attribute = &data.attributes()[index];
        let threshold = match &attribute.encoding {
            Encoding::Nominal(_) => match attribute.nominal_index(&condition.value) {
                Some(i) => i as f64,
                None => -1.0,
            },
            Encoding::Numeric => condition.numeric_value()?,
        };
        if !condition.operator.test(value.total_cmp(&threshold)) {
            return Ok(false);
        }
    }
    Ok(true)
}

/// True when every instance that binds all of the expression's variables
/// satisfies it.
fn is_tautology(expression: &Expr, instances: &[Instance]) -> bool {
    let variables = expression.variables();
    instances
        .iter()
        .filter(|i| variables.iter().all(|v| i.lookup(v).is_some()))
        .all(|i| expression.is_true(i))
}

impl GuardEstimator for LocalRefinementEstimator {
    fn name(&self) -> &'static str {
        "local"
    }

    /// Guards carry no quality: the refined leaves are not re-evaluated.
    fn estimate(&self, problem: &DecisionProblem<'_>) -> DiscoveryResult<Estimation> {
        let fit = fit_tree(
            self.learner.as_ref(),
            problem,
            ClassDomain::new(problem.classes.iter().cloned()),
            |instance| instance.target.clone(),
            self.config.no_leaf_policy,
        )?;

        let mut ranked = fit.tree.leaves()?;
        ranked.sort_by(|a, b| b.misclassified().total_cmp(&a.misclassified()));
        let threshold = (problem.params.num_fold_error_pruning + 1) as f64;

        let mut leaves = Vec::with_capacity(ranked.len());
        let mut refined = 0usize;
        for leaf in &ranked {
            if fit.domain.len() < 2 || leaf.misclassified() <= threshold {
                leaves.push(leaf.clone());
                continue;
            }
            match self.refine(leaf, &ranked, &fit, problem)? {
                Some(replacement) => {
                    refined += 1;
                    leaves.extend(replacement);
                }
                None => leaves.push(leaf.clone()),
            }
        }

        let mut guards = build_guards(&leaves, |label| fit.domain.resolve(label).cloned())?;
        for (class, estimation) in guards.iter_mut() {
            if !estimation.expression.is_const(true)
                && is_tautology(&estimation.expression, problem.instances)
            {
                debug!(class = %class, guard = %estimation.expression, "guard holds everywhere");
                estimation.expression = Expr::true_instance();
            }
        }
        apply_no_leaf_policy(
            &mut guards,
            fit.domain.classes().iter().cloned(),
            self.config.no_leaf_policy,
        );
        for estimation in guards.values_mut() {
            estimation.quality = None;
        }

        info!(
            decision_point = problem.decision_point,
            refined,
            leaves = leaves.len(),
            "local refinement finished"
        );
        Ok(Estimation {
            guards,
            quality: None,
            summary: fit.model.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fmt;
    use std::sync::Mutex;

    use super::*;
    use crate::attribute::{AttributeSchema, AttributeType};
    use crate::learn::{C45Learner, Evaluation, LearnResult, TreeModel};
    use crate::tree::Operator;

    const BASIC_TREE: &str = "digraph J48Tree {
N0 [label=\"x\" ]
N0->N1 [label=\"<= 5\"]
N1 [label=\"B (60.0/25.0)\" shape=box style=filled ]
N0->N2 [label=\"> 5\"]
N2 [label=\"D (20.0)\" shape=box style=filled ]
}
";

    const SPLIT_ON_Y: &str = "digraph J48Tree {
N0 [label=\"y\" ]
N0->N1 [label=\"<= 0\"]
N1 [label=\"A (10.0)\" shape=box style=filled ]
N0->N2 [label=\"> 0\"]
N2 [label=\"C (15.0/5.0)\" shape=box style=filled ]
}
";

    /// Hands out fixed tree graphs, one per `train` call.
    struct ScriptedLearner {
        graphs: Mutex<Vec<&'static str>>,
    }

    impl ScriptedLearner {
        fn new(graphs: &[&'static str]) -> Self {
            Self {
                graphs: Mutex::new(graphs.iter().rev().copied().collect()),
            }
        }
    }

    struct ScriptedModel {
        graph: String,
        evaluation: Evaluation,
    }

    impl fmt::Display for ScriptedModel {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.graph)
        }
    }

    impl TreeModel for ScriptedModel {
        fn graph(&self) -> String {
            self.graph.clone()
        }

        fn classify(&self, _values: &[Option<f64>]) -> usize {
            0
        }

        fn evaluation(&self) -> &Evaluation {
            &self.evaluation
        }

        fn num_leaves(&self) -> usize {
            self.graph.matches("shape=box").count()
        }
    }

    impl TreeLearner for ScriptedLearner {
        fn train(&self, data: &Dataset, _params: &TreeParams) -> LearnResult<Box<dyn TreeModel>> {
            let graph = self.graphs.lock().unwrap().pop().expect("no tree left to hand out");
            Ok(Box::new(ScriptedModel {
                graph: graph.to_string(),
                evaluation: Evaluation::new(data.class_labels().to_vec()),
            }))
        }
    }

    /// `B` dominates `x <= 5` but shares it with `A` and `C`, which `y` separates.
    fn overlapping() -> (AttributeSchema, Vec<Instance>, Vec<ClassId>) {
        let schema = AttributeSchema::new()
            .with_attribute("x", AttributeType::Continuous)
            .with_attribute("y", AttributeType::Continuous);
        let block = |n: usize, class: &str, x: f64, y: f64| {
            (0..n)
                .map(|_| Instance::new(class).with_value("x", x).with_value("y", y))
                .collect::<Vec<_>>()
        };
        let instances = [
            block(35, "B", 1.0, 0.0),
            block(10, "A", 2.0, -1.0),
            block(5, "A", 3.0, 1.0),
            block(10, "C", 3.0, 1.0),
            block(20, "D", 8.0, 0.0),
        ]
        .concat();
        let classes = ["A", "B", "C", "D"].map(ClassId::new).to_vec();
        (schema, instances, classes)
    }

    fn problem<'a>(
        schema: &'a AttributeSchema,
        instances: &'a [Instance],
        classes: &'a [ClassId],
    ) -> DecisionProblem<'a> {
        DecisionProblem {
            decision_point: "route",
            schema,
            classes,
            instances,
            params: TreeParams::default(),
        }
    }

    fn basic_fit(problem: &DecisionProblem<'_>) -> TreeFit<ClassId> {
        fit_tree(
            &ScriptedLearner::new(&[BASIC_TREE]),
            problem,
            ClassDomain::new(problem.classes.iter().cloned()),
            |instance| instance.target.clone(),
            NoLeafPolicy::TreatAsTrue,
        )
        .unwrap()
    }

    fn refine_with(
        secondary: &'static str,
        config: LocalRefinementConfig,
    ) -> (LeafDescriptor, Option<Vec<LeafDescriptor>>) {
        let (schema, instances, classes) = overlapping();
        let problem = problem(&schema, &instances, &classes);
        let fit = basic_fit(&problem);
        let ranked = fit.tree.leaves().unwrap();
        let estimator =
            LocalRefinementEstimator::new(Arc::new(ScriptedLearner::new(&[secondary])), config);
        let refined = estimator.refine(&ranked[0], &ranked, &fit, &problem).unwrap();
        (ranked[0].clone(), refined)
    }

    fn rendered(leaves: &[LeafDescriptor]) -> Vec<String> {
        leaves.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn secondary_splits_repartition_the_candidate() {
        let (candidate, refined) = refine_with(SPLIT_ON_Y, LocalRefinementConfig::default());
        let refined = refined.unwrap();
        assert_eq!(
            rendered(&refined),
            vec![
                "B (35) if x <= 5",
                "A (10) if x <= 5 and y <= 0",
                "C (15/5) if x <= 5 and y > 0",
            ]
        );
        let total: f64 = refined.iter().map(LeafDescriptor::instance_count).sum();
        assert_eq!(total, candidate.instance_count());
    }

    #[test]
    fn pure_secondary_leaf_is_merged_under_the_candidate_path() {
        const PURE: &str =
            "digraph J48Tree {\nN0 [label=\"A (25.0/1.0)\" shape=box style=filled ]\n}\n";
        let (candidate, refined) = refine_with(PURE, LocalRefinementConfig::default());
        let refined = refined.unwrap();
        assert_eq!(rendered(&refined), vec!["B (35) if x <= 5", "A (25/1) if x <= 5"]);
        let total: f64 = refined.iter().map(LeafDescriptor::instance_count).sum();
        assert_eq!(total, candidate.instance_count());
    }

    #[test]
    fn mixed_secondary_leaf_keeps_the_candidate() {
        const MIXED: &str =
            "digraph J48Tree {\nN0 [label=\"A (25.0/10.0)\" shape=box style=filled ]\n}\n";
        let (_, refined) = refine_with(MIXED, LocalRefinementConfig::default());
        assert_eq!(refined, None);

        // No basic leaf predicts A, so merging existing classes does not apply.
        let (_, refined) = refine_with(
            MIXED,
            LocalRefinementConfig {
                always_merge_existing_leafs: true,
                ..LocalRefinementConfig::default()
            },
        );
        assert_eq!(refined, None);
    }

    #[test]
    fn refined_guards_overlap_and_carry_no_quality() {
        let (schema, instances, classes) = overlapping();
        let problem = problem(&schema, &instances, &classes);
        let estimator = LocalRefinementEstimator::new(
            Arc::new(ScriptedLearner::new(&[BASIC_TREE, SPLIT_ON_Y])),
            LocalRefinementConfig::default(),
        );
        let estimation = estimator.estimate(&problem).unwrap();
        let guard = |class: &str| estimation.guards[&ClassId::new(class)].expression.to_string();
        assert_eq!(guard("A"), "x <= 5 && y <= 0");
        assert_eq!(guard("B"), "x <= 5");
        assert_eq!(guard("C"), "x <= 5 && y > 0");
        assert_eq!(guard("D"), "x > 5");
        assert!(estimation.guards.values().all(|g| g.quality.is_none()));
    }

    fn dataset() -> (AttributeSchema, Dataset) {
        let schema = AttributeSchema::new()
            .with_attribute("x", AttributeType::Continuous)
            .with_literals("s", ["a", "b"]);
        let domain = ClassDomain::new(["p", "q"].map(ClassId::new));
        let instances = vec![
            Instance::new("p").with_value("x", 1.0).with_value("s", "a"),
            Instance::new("q").with_value("x", 5.0).with_value("s", "b"),
            Instance::new("q").with_value("s", "b"),
        ];
        let data =
            Dataset::from_instances(&schema, &instances, &domain, |i| i.target.clone()).unwrap();
        (schema, data)
    }

    #[test]
    fn row_filter_respects_types_and_missing_values() {
        let (_, data) = dataset();
        let conditions = vec![
            Condition::new("x", AttributeType::Continuous, Operator::Gt, "2"),
            Condition::new("s", AttributeType::Literal, Operator::Eq, "b"),
        ];
        let passing: Vec<bool> = data
            .rows()
            .iter()
            .map(|row| satisfies_all(&data, row, &conditions).unwrap())
            .collect();
        assert_eq!(passing, vec![false, true, false]);

        let unknown = vec![Condition::new("s", AttributeType::Literal, Operator::Eq, "zzz")];
        assert!(!satisfies_all(&data, &data.rows()[0], &unknown).unwrap());
    }

    #[test]
    fn tautologies_ignore_instances_with_missing_values() {
        let expression = crate::expr::parse("x > 0").unwrap();
        let instances = vec![
            Instance::new("p").with_value("x", 1.0),
            Instance::new("p"),
            Instance::new("q").with_value("x", 3.0),
        ];
        assert!(is_tautology(&expression, &instances));
        let instances = vec![Instance::new("p").with_value("x", -1.0)];
        assert!(!is_tautology(&expression, &instances));
    }

    #[test]
    fn secondary_min_leaf_scales_with_subset() {
        let (_, data) = dataset();
        let estimator =
            LocalRefinementEstimator::new(Arc::new(C45Learner), LocalRefinementConfig::default());
        let base = TreeParams {
            min_num_obj: 10,
            cross_validate: true,
            ..TreeParams::default()
        };
        let subset = data.with_rows(data.rows()[..1].to_vec());
        let params = estimator.secondary_params(&base, &data, &subset);
        assert_eq!(params.min_num_obj, 4);
        assert!(!params.cross_validate);

        let keep = LocalRefinementEstimator::new(
            Arc::new(C45Learner),
            LocalRefinementConfig {
                reduce_min_leafs: false,
                ..LocalRefinementConfig::default()
            },
        );
        let params = keep.secondary_params(&base, &data, &subset);
        assert_eq!(params.min_num_obj, 10);
        assert!(params.cross_validate);
    }
}
