//! C4.5 classification tree induction.
//!
//! Splits are chosen by gain ratio among candidates whose information gain is
//! at least the average gain, numeric thresholds carry the MDL correction for
//! the number of candidate cut points, and the grown tree is first collapsed
//! and then pruned pessimistically at the configured confidence. Rows with a
//! missing split value follow the heaviest branch.

use std::fmt;

use tracing::debug;

use super::dataset::{Dataset, EncodedAttribute, Encoding};
use super::evaluation::Evaluation;
use super::stats::{add_errs, entropy};
use super::{LearnError, LearnResult, TreeLearner, TreeModel, TreeParams};
use crate::tree::TreeGraph;

/// C4.5 learner (gain ratio, pessimistic pruning).
#[derive(Debug, Clone, Copy, Default)]
pub struct C45Learner;

impl TreeLearner for C45Learner {
    fn train(&self, data: &Dataset, params: &TreeParams) -> LearnResult<Box<dyn TreeModel>> {
        params.validate()?;
        if data.is_empty() {
            return Err(LearnError::EmptyDataset);
        }
        if data.num_classes() == 0 {
            return Err(LearnError::NoClasses);
        }

        let root = build(data, params);
        let evaluation =
            if params.cross_validate && data.len() > params.cross_validation_folds + 1 {
                Evaluation::cross_validate(
                    data,
                    params.cross_validation_folds,
                    params.seed,
                    |fold| {
                        let fold_root = build(&fold, params);
                        move |values: &[Option<f64>]| fold_root.classify(values)
                    },
                )
            } else {
                Evaluation::on_rows(data.class_labels().to_vec(), data.rows(), |values| {
                    root.classify(values)
                })
            };

        let tree = C45Tree {
            root,
            attributes: data.attributes().to_vec(),
            labels: data.class_labels().to_vec(),
            evaluation,
            pruned: !params.unpruned,
        };
        debug!(
            rows = data.len(),
            leaves = tree.num_leaves(),
            cross_validated = tree.evaluation.is_cross_validated(),
            "trained C4.5 tree"
        );
        Ok(Box::new(tree))
    }
}

fn build(data: &Dataset, params: &TreeParams) -> Node {
    let grower = Grower { data, params };
    let rows: Vec<usize> = (0..data.len()).collect();
    let root = collapse(grower.grow(rows, 0));
    if params.unpruned {
        root
    } else {
        prune(root, params.confidence_factor)
    }
}

// ---------------------------------------------------------------------------
// Tree nodes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Test {
    /// Two branches: `<= t` and `> t`.
    Threshold(f64),
    /// One branch per domain value.
    Nominal,
    /// Two branches: `= v` and `!= v`.
    Binary(usize),
}

impl Test {
    fn branch(&self, value: f64, arity: usize) -> Option<usize> {
        match self {
            Self::Threshold(t) => Some(if value <= *t { 0 } else { 1 }),
            Self::Nominal => {
                let index = value as usize;
                (value >= 0.0 && index < arity).then_some(index)
            }
            Self::Binary(v) => Some(if value as usize == *v { 0 } else { 1 }),
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        distribution: Vec<f64>,
        class: usize,
    },
    Split {
        attribute: usize,
        test: Test,
        children: Vec<Node>,
        distribution: Vec<f64>,
        class: usize,
        missing_branch: usize,
    },
}

impl Node {
    fn distribution(&self) -> &[f64] {
        match self {
            Self::Leaf { distribution, .. } | Self::Split { distribution, .. } => distribution,
        }
    }

    fn class(&self) -> usize {
        match self {
            Self::Leaf { class, .. } | Self::Split { class, .. } => *class,
        }
    }

    /// Training weight this node would misclassify as a leaf.
    fn leaf_errors(&self) -> f64 {
        let distribution = self.distribution();
        let errors = distribution.iter().sum::<f64>() - distribution[self.class()];
        if errors < 1e-9 { 0.0 } else { errors }
    }

    fn training_errors(&self) -> f64 {
        match self {
            Self::Leaf { .. } => self.leaf_errors(),
            Self::Split { children, .. } => children.iter().map(Node::training_errors).sum(),
        }
    }

    fn num_leaves(&self) -> usize {
        match self {
            Self::Leaf { .. } => 1,
            Self::Split { children, .. } => children.iter().map(Node::num_leaves).sum(),
        }
    }

    fn size(&self) -> usize {
        match self {
            Self::Leaf { .. } => 1,
            Self::Split { children, .. } => 1 + children.iter().map(Node::size).sum::<usize>(),
        }
    }

    fn classify(&self, values: &[Option<f64>]) -> usize {
        let mut node = self;
        loop {
            match node {
                Self::Leaf { class, .. } => return *class,
                Self::Split {
                    attribute,
                    test,
                    children,
                    missing_branch,
                    ..
                } => {
                    let branch = values
                        .get(*attribute)
                        .copied()
                        .flatten()
                        .and_then(|v| test.branch(v, children.len()))
                        .unwrap_or(*missing_branch);
                    node = &children[branch];
                }
            }
        }
    }
}

fn argmax(distribution: &[f64], fallback: usize) -> usize {
    let mut best = fallback;
    let mut best_weight = 0.0;
    for (class, &weight) in distribution.iter().enumerate() {
        if weight > best_weight {
            best = class;
            best_weight = weight;
        }
    }
    best
}

// ---------------------------------------------------------------------------
// Growing
// ---------------------------------------------------------------------------

struct Candidate {
    attribute: usize,
    test: Test,
    gain: f64,
    ratio: f64,
}

struct Grower<'a> {
    data: &'a Dataset,
    params: &'a TreeParams,
}

impl Grower<'_> {
    fn min_obj(&self) -> f64 {
        self.params.min_num_obj as f64
    }

    fn class_distribution(&self, rows: &[usize]) -> Vec<f64> {
        let mut distribution = vec![0.0; self.data.num_classes()];
        for &r in rows {
            let row = &self.data.rows()[r];
            distribution[row.class] += row.weight;
        }
        distribution
    }

    fn grow(&self, rows: Vec<usize>, fallback: usize) -> Node {
        let distribution = self.class_distribution(&rows);
        let class = argmax(&distribution, fallback);
        let total: f64 = distribution.iter().sum();

        let leaf = |distribution| Node::Leaf {
            distribution,
            class,
        };
        if total < 2.0 * self.min_obj() || distribution[class] >= total {
            return leaf(distribution);
        }
        let Some(split) = self.select_split(&rows, total) else {
            return leaf(distribution);
        };

        let arity = match split.test {
            Test::Nominal => match &self.data.attributes()[split.attribute].encoding {
                Encoding::Nominal(domain) => domain.len(),
                Encoding::Numeric => 2,
            },
            Test::Threshold(_) | Test::Binary(_) => 2,
        };
        let mut branches = vec![Vec::new(); arity];
        let mut branch_weights = vec![0.0; arity];
        let mut missing = Vec::new();
        for r in rows {
            let row = &self.data.rows()[r];
            match row.values[split.attribute].and_then(|v| split.test.branch(v, arity)) {
                Some(b) => {
                    branches[b].push(r);
                    branch_weights[b] += row.weight;
                }
                None => missing.push(r),
            }
        }
        let missing_branch = argmax(&branch_weights, 0);
        branches[missing_branch].extend(missing);

        let children = branches
            .into_iter()
            .map(|branch| {
                if branch.is_empty() {
                    Node::Leaf {
                        distribution: vec![0.0; self.data.num_classes()],
                        class,
                    }
                } else {
                    self.grow(branch, class)
                }
            })
            .collect();

        Node::Split {
            attribute: split.attribute,
            test: split.test,
            children,
            distribution,
            class,
            missing_branch,
        }
    }

    fn select_split(&self, rows: &[usize], total: f64) -> Option<Candidate> {
        let candidates: Vec<Candidate> = self
            .data
            .attributes()
            .iter()
            .enumerate()
            .filter_map(|(a, attribute)| match &attribute.encoding {
                Encoding::Numeric => self.numeric_split(a, rows, total),
                Encoding::Nominal(domain) if self.params.binary_split => {
                    self.binary_split(a, domain.len(), rows, total)
                }
                Encoding::Nominal(domain) => self.nominal_split(a, domain.len(), rows, total),
            })
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let average = candidates.iter().map(|c| c.gain).sum::<f64>() / candidates.len() as f64;
        let mut best: Option<Candidate> = None;
        for candidate in candidates {
            if candidate.gain < average - 1e-3 || candidate.ratio <= 0.0 {
                continue;
            }
            if best.as_ref().is_none_or(|b| candidate.ratio > b.ratio) {
                best = Some(candidate);
            }
        }
        best
    }

    fn numeric_split(&self, attribute: usize, rows: &[usize], total: f64) -> Option<Candidate> {
        let k = self.data.num_classes();
        let mut known: Vec<(f64, usize, f64)> = rows
            .iter()
            .filter_map(|&r| {
                let row = &self.data.rows()[r];
                row.values[attribute].map(|v| (v, row.class, row.weight))
            })
            .collect();
        if known.len() < 2 {
            return None;
        }
        known.sort_by(|x, y| x.0.total_cmp(&y.0));

        let known_weight: f64 = known.iter().map(|&(_, _, w)| w).sum();
        if known_weight < 2.0 * self.min_obj() {
            return None;
        }
        let mut min_split = 0.1 * known_weight / k as f64;
        if min_split <= self.min_obj() {
            min_split = self.min_obj();
        } else if min_split > 25.0 {
            min_split = 25.0;
        }

        let mut right = vec![0.0; k];
        for &(_, class, weight) in &known {
            right[class] += weight;
        }
        let base = entropy(&right);
        let mut left = vec![0.0; k];
        let mut left_weight = 0.0;
        let mut split_points = 0usize;
        let mut best: Option<(f64, f64, f64)> = None;

        for i in 0..known.len() - 1 {
            let (value, class, weight) = known[i];
            left[class] += weight;
            right[class] -= weight;
            left_weight += weight;
            if value >= known[i + 1].0 {
                continue;
            }
            let right_weight = known_weight - left_weight;
            if left_weight < min_split || right_weight < min_split {
                continue;
            }
            split_points += 1;
            let gain = base
                - (left_weight / known_weight) * entropy(&left)
                - (right_weight / known_weight) * entropy(&right);
            if best.is_none_or(|(g, _, _)| gain > g) {
                best = Some((gain, value, left_weight));
            }
        }

        let (gain, threshold, left_weight) = best?;
        let gain = (known_weight / total) * gain - (split_points as f64).log2() / total;
        if gain <= 1e-10 {
            return None;
        }
        let split_info = entropy(&[left_weight, known_weight - left_weight, total - known_weight]);
        if split_info <= 0.0 {
            return None;
        }
        Some(Candidate {
            attribute,
            test: Test::Threshold(threshold),
            gain,
            ratio: gain / split_info,
        })
    }

    /// Class distribution of every domain value among rows with a known value.
    fn bags(&self, attribute: usize, arity: usize, rows: &[usize]) -> Vec<Vec<f64>> {
        let mut bags = vec![vec![0.0; self.data.num_classes()]; arity];
        for &r in rows {
            let row = &self.data.rows()[r];
            if let Some(v) = row.values[attribute] {
                if let Some(bag) = bags.get_mut(v as usize) {
                    bag[row.class] += row.weight;
                }
            }
        }
        bags
    }

    fn nominal_split(
        &self,
        attribute: usize,
        arity: usize,
        rows: &[usize],
        total: f64,
    ) -> Option<Candidate> {
        let bags = self.bags(attribute, arity, rows);
        let weights: Vec<f64> = bags.iter().map(|b| b.iter().sum()).collect();
        let known: f64 = weights.iter().sum();
        if known <= 0.0 || weights.iter().filter(|&&w| w >= self.min_obj()).count() < 2 {
            return None;
        }
        let mut known_distribution = vec![0.0; self.data.num_classes()];
        for bag in &bags {
            for (class, w) in bag.iter().enumerate() {
                known_distribution[class] += w;
            }
        }
        let remainder: f64 = bags
            .iter()
            .zip(&weights)
            .map(|(bag, &w)| (w / known) * entropy(bag))
            .sum();
        let gain = (known / total) * (entropy(&known_distribution) - remainder);
        if gain <= 1e-10 {
            return None;
        }
        let mut split_weights = weights;
        split_weights.push(total - known);
        let split_info = entropy(&split_weights);
        if split_info <= 0.0 {
            return None;
        }
        Some(Candidate {
            attribute,
            test: Test::Nominal,
            gain,
            ratio: gain / split_info,
        })
    }

    fn binary_split(
        &self,
        attribute: usize,
        arity: usize,
        rows: &[usize],
        total: f64,
    ) -> Option<Candidate> {
        let bags = self.bags(attribute, arity, rows);
        let k = self.data.num_classes();
        let mut known_distribution = vec![0.0; k];
        for bag in &bags {
            for (class, w) in bag.iter().enumerate() {
                known_distribution[class] += w;
            }
        }
        let known: f64 = known_distribution.iter().sum();
        if known <= 0.0 {
            return None;
        }
        let base = entropy(&known_distribution);

        let mut best: Option<(f64, usize, f64)> = None;
        for (value, bag) in bags.iter().enumerate() {
            let inside: f64 = bag.iter().sum();
            let outside = known - inside;
            if inside < self.min_obj() || outside < self.min_obj() {
                continue;
            }
            let rest: Vec<f64> = known_distribution
                .iter()
                .zip(bag)
                .map(|(all, part)| all - part)
                .collect();
            let gain =
                base - (inside / known) * entropy(bag) - (outside / known) * entropy(&rest);
            if best.is_none_or(|(g, _, _)| gain > g) {
                best = Some((gain, value, inside));
            }
        }

        let (gain, value, inside) = best?;
        let gain = (known / total) * gain;
        if gain <= 1e-10 {
            return None;
        }
        let split_info = entropy(&[inside, known - inside, total - known]);
        if split_info <= 0.0 {
            return None;
        }
        Some(Candidate {
            attribute,
            test: Test::Binary(value),
            gain,
            ratio: gain / split_info,
        })
    }
}

// ---------------------------------------------------------------------------
// Collapsing and pruning
// ---------------------------------------------------------------------------

/// Replace subtrees that do not reduce training error with leaves.
fn collapse(node: Node) -> Node {
    match node {
        Node::Leaf { .. } => node,
        Node::Split {
            attribute,
            test,
            children,
            distribution,
            class,
            missing_branch,
        } => {
            let children: Vec<Node> = children.into_iter().map(collapse).collect();
            let split = Node::Split {
                attribute,
                test,
                children,
                distribution,
                class,
                missing_branch,
            };
            if split.training_errors() >= split.leaf_errors() - 1e-3 {
                into_leaf(split)
            } else {
                split
            }
        }
    }
}

fn estimated_errors(node: &Node, confidence: f64) -> f64 {
    match node {
        Node::Leaf { .. } => leaf_estimate(node, confidence),
        Node::Split { children, .. } => children
            .iter()
            .map(|c| estimated_errors(c, confidence))
            .sum(),
    }
}

fn leaf_estimate(node: &Node, confidence: f64) -> f64 {
    let total: f64 = node.distribution().iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let errors = node.leaf_errors();
    errors + add_errs(total, errors, confidence)
}

/// Pessimistic pruning: a subtree whose estimated errors are not clearly
/// below those of a single leaf becomes that leaf.
fn prune(node: Node, confidence: f64) -> Node {
    match node {
        Node::Leaf { .. } => node,
        Node::Split {
            attribute,
            test,
            children,
            distribution,
            class,
            missing_branch,
        } => {
            let children: Vec<Node> = children
                .into_iter()
                .map(|c| prune(c, confidence))
                .collect();
            let split = Node::Split {
                attribute,
                test,
                children,
                distribution,
                class,
                missing_branch,
            };
            if leaf_estimate(&split, confidence) <= estimated_errors(&split, confidence) + 0.1 {
                into_leaf(split)
            } else {
                split
            }
        }
    }
}

fn into_leaf(node: Node) -> Node {
    match node {
        Node::Split {
            distribution,
            class,
            ..
        } => Node::Leaf {
            distribution,
            class,
        },
        leaf => leaf,
    }
}

// ---------------------------------------------------------------------------
// Trained model
// ---------------------------------------------------------------------------

struct C45Tree {
    root: Node,
    attributes: Vec<EncodedAttribute>,
    labels: Vec<String>,
    evaluation: Evaluation,
    pruned: bool,
}

impl C45Tree {
    fn node_label(&self, node: &Node) -> String {
        match node {
            Node::Split { attribute, .. } => self.attributes[*attribute].name.clone(),
            Node::Leaf { .. } => {
                let total: f64 = node.distribution().iter().sum();
                let errors = node.leaf_errors();
                let label = &self.labels[node.class()];
                if errors > 0.0 {
                    format!("{label} ({total}/{errors})")
                } else {
                    format!("{label} ({total})")
                }
            }
        }
    }

    fn edge_label(&self, attribute: usize, test: &Test, slot: usize) -> String {
        let attribute = &self.attributes[attribute];
        match test {
            Test::Threshold(t) if slot == 0 => format!("<= {t}"),
            Test::Threshold(t) => format!("> {t}"),
            Test::Nominal => format!("= {}", attribute.nominal_value(slot).unwrap_or_default()),
            Test::Binary(v) => {
                let value = attribute.nominal_value(*v).unwrap_or_default();
                if slot == 0 {
                    format!("= {value}")
                } else {
                    format!("!= {value}")
                }
            }
        }
    }

    fn render(&self) -> TreeGraph {
        let mut graph = TreeGraph::new(self.node_label(&self.root));
        let mut stack = vec![(&self.root, graph.root())];
        while let Some((node, id)) = stack.pop() {
            if let Node::Split {
                attribute,
                test,
                children,
                ..
            } = node
            {
                for (slot, child) in children.iter().enumerate() {
                    let child_id = graph.add_child(
                        id,
                        self.edge_label(*attribute, test, slot),
                        self.node_label(child),
                    );
                    stack.push((child, child_id));
                }
            }
        }
        graph
    }

    fn dump(&self, node: &Node, depth: usize, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Node::Split {
            attribute,
            test,
            children,
            ..
        } = node
        else {
            return Ok(());
        };
        for (slot, child) in children.iter().enumerate() {
            f.write_str("\n")?;
            for _ in 0..depth {
                f.write_str("|   ")?;
            }
            write!(
                f,
                "{} {}",
                self.attributes[*attribute].name,
                self.edge_label(*attribute, test, slot)
            )?;
            match child {
                Node::Leaf { .. } => write!(f, ": {}", self.node_label(child))?,
                Node::Split { .. } => self.dump(child, depth + 1, f)?,
            }
        }
        Ok(())
    }
}

impl TreeModel for C45Tree {
    fn graph(&self) -> String {
        self.render().to_string()
    }

    fn classify(&self, values: &[Option<f64>]) -> usize {
        self.root.classify(values)
    }

    fn evaluation(&self) -> &Evaluation {
        &self.evaluation
    }

    fn num_leaves(&self) -> usize {
        self.root.num_leaves()
    }
}

impl fmt::Display for C45Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "C4.5 {} tree", if self.pruned { "pruned" } else { "unpruned" })?;
        writeln!(f, "------------------")?;
        match &self.root {
            Node::Leaf { .. } => write!(f, "\n: {}", self.node_label(&self.root))?,
            Node::Split { .. } => self.dump(&self.root, 0, f)?,
        }
        writeln!(f, "\n")?;
        writeln!(f, "Number of Leaves  : \t{}", self.root.num_leaves())?;
        writeln!(f, "Size of the tree : \t{}", self.root.size())?;
        writeln!(f)?;
        write!(f, "{}", self.evaluation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{AttributeSchema, AttributeType, Instance};
    use crate::class::{ClassDomain, ClassId};
    use crate::tree::ClassificationTree;

    /// x in 0..5: A; x in 5..10: 7 B and 3 C each; x in 10..15: C.
    fn banded() -> (AttributeSchema, Vec<Instance>) {
        let mut instances = Vec::new();
        for x in 0..15i64 {
            let mix: &[(&str, usize)] = match x {
                0..=4 => &[("A", 4)],
                5..=9 => &[("B", 7), ("C", 3)],
                _ => &[("C", 4)],
            };
            for &(class, n) in mix {
                for _ in 0..n {
                    instances.push(Instance::new(class).with_value("x", x));
                }
            }
        }
        let schema = AttributeSchema::new().with_attribute("x", AttributeType::Discrete);
        (schema, instances)
    }

    fn encode(schema: &AttributeSchema, instances: &[Instance]) -> Dataset {
        let domain = ClassDomain::new(["A", "B", "C"].map(ClassId::new));
        Dataset::from_instances(schema, instances, &domain, |i| i.target.clone()).unwrap()
    }

    #[test]
    fn learns_banded_thresholds() {
        let (schema, instances) = banded();
        let data = encode(&schema, &instances);
        let model = C45Learner.train(&data, &TreeParams::default()).unwrap();
        assert_eq!(model.num_leaves(), 3);

        let tree = ClassificationTree::parse(&model.graph(), &schema).unwrap();
        let leaves: Vec<_> = tree
            .leaves()
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            leaves,
            vec![
                "A (20) if x <= 4",
                "B (50/15) if x > 4 and x <= 9",
                "C (20) if x > 9",
            ]
        );

        let eval = model.evaluation();
        assert!((eval.precision(1) - 0.7).abs() < 1e-9);
        assert!((eval.recall(2) - 20.0 / 35.0).abs() < 1e-9);
        assert_eq!(model.classify(&[Some(12.0)]), 2);
        assert_eq!(model.classify(&[None]), 1);
    }

    #[test]
    fn pure_data_gives_a_root_leaf() {
        let schema = AttributeSchema::new().with_attribute("x", AttributeType::Continuous);
        let instances: Vec<_> = (0..10)
            .map(|i| Instance::new("A").with_value("x", i as f64))
            .collect();
        let data = encode(&schema, &instances);
        let model = C45Learner.train(&data, &TreeParams::default()).unwrap();
        assert_eq!(model.num_leaves(), 1);
        assert!(model.graph().contains("[label=\"A (10)\" shape=box style=filled ]"));
    }

    #[test]
    fn nominal_splits_multiway_and_binary() {
        let schema = AttributeSchema::new().with_literals("tier", ["gold", "silver", "bronze"]);
        let mut instances = Vec::new();
        for (tier, class) in [("gold", "A"), ("silver", "B"), ("bronze", "B")] {
            for _ in 0..6 {
                instances.push(Instance::new(class).with_value("tier", tier));
            }
        }
        let data = encode(&schema, &instances);

        let multiway = C45Learner.train(&data, &TreeParams::default()).unwrap();
        let graph = multiway.graph();
        assert!(graph.contains("[label=\"= bronze\"]"));
        assert!(graph.contains("[label=\"= gold\"]"));

        let params = TreeParams {
            binary_split: true,
            ..TreeParams::default()
        };
        let binary = C45Learner.train(&data, &params).unwrap();
        assert_eq!(binary.num_leaves(), 2);
        assert!(binary.graph().contains("[label=\"!= gold\"]"));
    }

    #[test]
    fn cross_validation_is_deterministic() {
        let (schema, instances) = banded();
        let data = encode(&schema, &instances);
        let params = TreeParams {
            cross_validate: true,
            ..TreeParams::default()
        };
        let first = C45Learner.train(&data, &params).unwrap();
        let second = C45Learner.train(&data, &params).unwrap();
        assert!(first.evaluation().is_cross_validated());
        assert_eq!(first.evaluation(), second.evaluation());
        assert!((first.evaluation().total_weight() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_bad_input() {
        let schema = AttributeSchema::new().with_attribute("x", AttributeType::Continuous);
        let empty = encode(&schema, &[]);
        assert!(matches!(
            C45Learner.train(&empty, &TreeParams::default()),
            Err(LearnError::EmptyDataset)
        ));
        let (schema, instances) = banded();
        let data = encode(&schema, &instances);
        let params = TreeParams {
            confidence_factor: 0.9,
            ..TreeParams::default()
        };
        assert!(matches!(
            C45Learner.train(&data, &params),
            Err(LearnError::InvalidParams { .. })
        ));
    }
}
