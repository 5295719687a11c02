//! Typed view of a trained classification tree.
//!
//! [`ClassificationTree`] turns a [`TreeGraph`] into tagged internal and leaf
//! nodes using the attribute schema, and enumerates every leaf together with
//! its simplified root-to-leaf path as a [`LeafDescriptor`].

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use super::condition::{Condition, simplify};
use super::error::{TreeError, TreeResult};
use super::graph::TreeGraph;
use crate::attribute::AttributeSchema;
use crate::expr::{self, Expr};

static LEAF_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:[0-9]+\s:\s)?(.*)\s\(([0-9]*\.?[0-9]+(?:[eE][-+]?[0-9]+)?)(?:/([0-9]*\.?[0-9]+(?:[eE][-+]?[0-9]+)?))?\)$",
    )
    .unwrap()
});

static NODE_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[0-9]+:\s)?(.+?)$").unwrap());

/// Index of a node inside a [`ClassificationTree`].
pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq)]
pub enum TreeNode {
    Internal {
        attribute: String,
        children: Vec<(Condition, NodeId)>,
    },
    Leaf {
        class: String,
        instance_count: f64,
        misclassified: f64,
    },
}

/// A parsed tree. Nodes are stored in pre-order, so the root is node 0.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationTree {
    nodes: Vec<TreeNode>,
    parents: Vec<Option<(NodeId, usize)>>,
}

impl ClassificationTree {
    /// Parse tree text and type it against `schema`.
    pub fn parse(text: &str, schema: &AttributeSchema) -> TreeResult<Self> {
        Self::from_graph(&TreeGraph::parse(text)?, schema)
    }

    pub fn from_graph(graph: &TreeGraph, schema: &AttributeSchema) -> TreeResult<Self> {
        let order = graph.pre_order();
        let mut ids = vec![0; graph.len()];
        for (id, &index) in order.iter().enumerate() {
            ids[index] = id;
        }

        let mut nodes = Vec::with_capacity(order.len());
        let mut parents = vec![None; order.len()];
        for &index in &order {
            let node = graph.node(index);
            if node.edges.is_empty() {
                nodes.push(parse_leaf(&node.label)?);
                continue;
            }
            let attribute = NODE_LABEL
                .captures(node.label.trim())
                .map(|caps| caps[1].to_string())
                .unwrap_or_default();
            let kind = schema
                .attribute_type(&attribute)
                .ok_or_else(|| TreeError::UnknownAttribute {
                    attribute: attribute.clone(),
                })?;
            let mut children = Vec::with_capacity(node.edges.len());
            for (slot, edge) in node.edges.iter().enumerate() {
                let child = ids[edge.target];
                parents[child] = Some((ids[index], slot));
                children.push((Condition::from_edge(&attribute, kind, &edge.label)?, child));
            }
            nodes.push(TreeNode::Internal {
                attribute,
                children,
            });
        }

        Ok(Self { nodes, parents })
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn num_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::Leaf { .. }))
            .count()
    }

    /// Length of the longest root-to-leaf path; a tree that is a single leaf has depth 0.
    pub fn depth(&self) -> usize {
        let mut depths = vec![0usize; self.nodes.len()];
        for id in 1..self.nodes.len() {
            if let Some((parent, _)) = self.parents[id] {
                depths[id] = depths[parent] + 1;
            }
        }
        depths.into_iter().max().unwrap_or(0)
    }

    /// Raw conditions from the root down to `id`.
    pub fn path_conditions(&self, id: NodeId) -> Vec<Condition> {
        let mut path = Vec::new();
        let mut current = id;
        while let Some((parent, slot)) = self.parents[current] {
            if let TreeNode::Internal { children, .. } = &self.nodes[parent] {
                path.push(children[slot].0.clone());
            }
            current = parent;
        }
        path.reverse();
        path
    }

    /// Every leaf in pre-order with its simplified path.
    pub fn leaves(&self) -> TreeResult<Vec<LeafDescriptor>> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(id, node)| match node {
                TreeNode::Leaf {
                    class,
                    instance_count,
                    misclassified,
                } => Some(LeafDescriptor::new(
                    class.clone(),
                    self.path_conditions(id),
                    *instance_count,
                    *misclassified,
                )),
                TreeNode::Internal { .. } => None,
            })
            .collect()
    }
}

fn parse_leaf(label: &str) -> TreeResult<TreeNode> {
    let malformed = || TreeError::MalformedLeafLabel {
        label: label.to_string(),
    };
    let caps = LEAF_LABEL.captures(label.trim()).ok_or_else(malformed)?;
    let count = |i: usize| -> TreeResult<f64> {
        caps.get(i)
            .map_or(Ok(0.0), |m| m.as_str().parse::<f64>().map_err(|_| malformed()))
    };
    Ok(TreeNode::Leaf {
        class: caps[1].to_string(),
        instance_count: count(2)?,
        misclassified: count(3)?,
    })
}

// ---------------------------------------------------------------------------
// Leaf descriptors
// ---------------------------------------------------------------------------

/// A leaf's predicted class, its simplified path and its training counts.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafDescriptor {
    class: String,
    conditions: Vec<Condition>,
    instance_count: f64,
    misclassified: f64,
}

impl LeafDescriptor {
    /// Build a descriptor, simplifying `conditions`.
    pub fn new(
        class: impl Into<String>,
        conditions: Vec<Condition>,
        instance_count: f64,
        misclassified: f64,
    ) -> TreeResult<Self> {
        Ok(Self {
            class: class.into(),
            conditions: simplify(conditions)?,
            instance_count,
            misclassified,
        })
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn instance_count(&self) -> f64 {
        self.instance_count
    }

    pub fn misclassified(&self) -> f64 {
        self.misclassified
    }

    /// Prefix this leaf's path with `prefix` and re-simplify.
    pub fn with_prefix(&self, prefix: &[Condition]) -> TreeResult<Self> {
        let mut conditions = prefix.to_vec();
        conditions.extend(self.conditions.iter().cloned());
        Self::new(
            self.class.clone(),
            conditions,
            self.instance_count,
            self.misclassified,
        )
    }

    /// The path as a conjunction, or `None` for the root leaf.
    pub fn expression(&self) -> TreeResult<Option<Expr>> {
        if self.conditions.is_empty() {
            return Ok(None);
        }
        let parts = self
            .conditions
            .iter()
            .map(|c| c.to_expression_string().map(|text| format!("({text})")))
            .collect::<TreeResult<Vec<_>>>()?;
        Ok(Some(expr::parse(&parts.join(" && "))?))
    }
}

impl fmt::Display for LeafDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}", self.class, self.instance_count)?;
        if self.misclassified > 0.0 {
            write!(f, "/{}", self.misclassified)?;
        }
        f.write_str(")")?;
        for (i, c) in self.conditions.iter().enumerate() {
            f.write_str(if i == 0 { " if " } else { " and " })?;
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeType;
    use crate::tree::condition::Operator;

    const REFUND_TREE: &str = r#"digraph J48Tree {
N0 [label="amount" ]
N0->N1 [label="<= 500"]
N1 [label="approve (40.0/2.0)" shape=box style=filled ]
N0->N2 [label="> 500"]
N2 [label="customer" ]
N2->N3 [label="= gold"]
N3 [label="approve (10.0)" shape=box style=filled ]
N2->N4 [label="= silver"]
N4 [label="reject (25.0/3.0)" shape=box style=filled ]
N2->N5 [label="= bronze"]
N5 [label="reject (0.0)" shape=box style=filled ]
}
"#;

    fn schema() -> AttributeSchema {
        AttributeSchema::new()
            .with_attribute("amount", AttributeType::Continuous)
            .with_literals("customer", ["gold", "silver", "bronze"])
    }

    #[test]
    fn enumerates_leaves_in_pre_order() {
        let tree = ClassificationTree::parse(REFUND_TREE, &schema()).unwrap();
        assert_eq!(tree.depth(), 2);
        assert_eq!(tree.num_leaves(), 4);
        let leaves = tree.leaves().unwrap();
        let summary: Vec<_> = leaves.iter().map(ToString::to_string).collect();
        assert_eq!(
            summary,
            vec![
                "approve (40/2) if amount <= 500",
                "approve (10) if amount > 500 and customer = gold",
                "reject (25/3) if amount > 500 and customer = silver",
                "reject (0) if amount > 500 and customer = bronze",
            ]
        );
        assert_eq!(
            leaves[1].expression().unwrap().unwrap().to_string(),
            "amount > 500 && customer == \"gold\""
        );
    }

    #[test]
    fn root_leaf_has_no_expression() {
        let text = "digraph J48Tree {\nN0 [label=\"approve (12.0/1.0)\" shape=box style=filled ]\n}\n";
        let tree = ClassificationTree::parse(text, &schema()).unwrap();
        assert_eq!(tree.depth(), 0);
        let leaves = tree.leaves().unwrap();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].instance_count(), 12.0);
        assert_eq!(leaves[0].misclassified(), 1.0);
        assert!(leaves[0].expression().unwrap().is_none());
    }

    #[test]
    fn leaf_labels_accept_prefixes_and_exponents() {
        let TreeNode::Leaf {
            class,
            instance_count,
            misclassified,
        } = parse_leaf("3 : pay now (1.5E3/.5)").unwrap()
        else {
            panic!("expected a leaf");
        };
        assert_eq!(class, "pay now");
        assert_eq!(instance_count, 1500.0);
        assert_eq!(misclassified, 0.5);
        assert!(matches!(
            parse_leaf("no counts here"),
            Err(TreeError::MalformedLeafLabel { .. })
        ));
    }

    #[test]
    fn counts_are_read_from_the_end_of_the_label() {
        let TreeNode::Leaf {
            class,
            instance_count,
            misclassified,
        } = parse_leaf("Send reminder (2) (6.0/1.0)").unwrap()
        else {
            panic!("expected a leaf");
        };
        assert_eq!(class, "Send reminder (2)");
        assert_eq!(instance_count, 6.0);
        assert_eq!(misclassified, 1.0);

        let TreeNode::Leaf {
            class,
            instance_count,
            ..
        } = parse_leaf("Send reminder (2) (6)").unwrap()
        else {
            panic!("expected a leaf");
        };
        assert_eq!(class, "Send reminder (2)");
        assert_eq!(instance_count, 6.0);
        assert!(matches!(
            parse_leaf("approve (4) trailing"),
            Err(TreeError::MalformedLeafLabel { .. })
        ));
    }

    #[test]
    fn unknown_attributes_are_rejected() {
        let text = "digraph T {\nN0 [label=\"weight\" ]\nN0->N1 [label=\"<= 1\"]\nN1 [label=\"a (1.0)\" ]\nN0->N2 [label=\"> 1\"]\nN2 [label=\"b (1.0)\" ]\n}";
        assert!(matches!(
            ClassificationTree::parse(text, &schema()),
            Err(TreeError::UnknownAttribute { attribute }) if attribute == "weight"
        ));
    }

    #[test]
    fn prefixing_resimplifies() {
        let tree = ClassificationTree::parse(REFUND_TREE, &schema()).unwrap();
        let leaf = &tree.leaves().unwrap()[0];
        let prefix = vec![Condition::new(
            "amount",
            AttributeType::Continuous,
            Operator::Gt,
            "100",
        )];
        let merged = leaf.with_prefix(&prefix).unwrap();
        assert_eq!(
            merged.expression().unwrap().unwrap().to_string(),
            "amount > 100 && amount <= 500"
        );
    }
}
