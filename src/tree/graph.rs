//! Labelled tree graphs in `digraph` text form.
//!
//! This is the interchange format between a trained learner and the leaf
//! extractor: nodes carry a label, edges carry a condition label, and leaves
//! are nodes without outgoing edges.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use super::error::{TreeError, TreeResult};

static NODE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(N\w+)\s*\[label="((?:[^"\\]|\\.)*)"[^\]]*\]\s*;?$"#).unwrap()
});

static EDGE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(N\w+)\s*->\s*(N\w+)\s*\[label="((?:[^"\\]|\\.)*)"[^\]]*\]\s*;?$"#).unwrap()
});

#[derive(Debug, Clone, PartialEq)]
pub struct GraphEdge {
    pub label: String,
    pub target: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub name: String,
    pub label: String,
    pub edges: Vec<GraphEdge>,
    pub parent: Option<usize>,
}

/// A rooted tree with labelled nodes and edges.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeGraph {
    nodes: Vec<GraphNode>,
    root: usize,
}

impl TreeGraph {
    /// Start a graph with a single root node.
    pub fn new(root_label: impl Into<String>) -> Self {
        Self {
            nodes: vec![GraphNode {
                name: "N0".into(),
                label: root_label.into(),
                edges: Vec::new(),
                parent: None,
            }],
            root: 0,
        }
    }

    /// Append a child under `parent` and return its index.
    pub fn add_child(
        &mut self,
        parent: usize,
        edge_label: impl Into<String>,
        label: impl Into<String>,
    ) -> usize {
        let index = self.nodes.len();
        self.nodes.push(GraphNode {
            name: format!("N{index}"),
            label: label.into(),
            edges: Vec::new(),
            parent: Some(parent),
        });
        self.nodes[parent].edges.push(GraphEdge {
            label: edge_label.into(),
            target: index,
        });
        index
    }

    /// Parse `digraph` text. The first declared node is the root.
    pub fn parse(text: &str) -> TreeResult<Self> {
        let mut nodes: Vec<GraphNode> = Vec::new();
        let mut by_name: HashMap<String, usize> = HashMap::new();
        let mut edges: Vec<(usize, String, String, String)> = Vec::new();

        for (number, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line == "}" || line.starts_with("digraph") {
                continue;
            }
            if let Some(caps) = EDGE_LINE.captures(line) {
                edges.push((
                    number + 1,
                    caps[1].to_string(),
                    caps[2].to_string(),
                    unescape(&caps[3]),
                ));
            } else if let Some(caps) = NODE_LINE.captures(line) {
                let name = caps[1].to_string();
                if by_name.contains_key(&name) {
                    return Err(TreeError::Graph {
                        line: number + 1,
                        message: format!("node {name} declared twice"),
                    });
                }
                by_name.insert(name.clone(), nodes.len());
                nodes.push(GraphNode {
                    name,
                    label: unescape(&caps[2]),
                    edges: Vec::new(),
                    parent: None,
                });
            } else {
                return Err(TreeError::Graph {
                    line: number + 1,
                    message: format!("unrecognized statement '{line}'"),
                });
            }
        }

        if nodes.is_empty() {
            return Err(TreeError::EmptyGraph);
        }

        for (line, from, to, label) in edges {
            let lookup = |name: &str| {
                by_name.get(name).copied().ok_or_else(|| TreeError::Graph {
                    line,
                    message: format!("edge refers to undeclared node {name}"),
                })
            };
            let source = lookup(&from)?;
            let target = lookup(&to)?;
            if target == 0 || nodes[target].parent.is_some() {
                return Err(TreeError::Graph {
                    line,
                    message: format!("node {to} has more than one parent"),
                });
            }
            nodes[target].parent = Some(source);
            nodes[source].edges.push(GraphEdge { label, target });
        }

        if let Some(orphan) = nodes.iter().skip(1).find(|n| n.parent.is_none()) {
            return Err(TreeError::Graph {
                line: 0,
                message: format!("node {} is not connected to the root", orphan.name),
            });
        }

        Ok(Self { nodes, root: 0 })
    }

    pub fn root(&self) -> usize {
        self.root
    }

    pub fn node(&self, index: usize) -> &GraphNode {
        &self.nodes[index]
    }

    pub fn is_leaf(&self, index: usize) -> bool {
        self.nodes[index].edges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node indices in pre-order, children in edge order.
    pub fn pre_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(index) = stack.pop() {
            order.push(index);
            stack.extend(self.nodes[index].edges.iter().rev().map(|e| e.target));
        }
        order
    }
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

impl fmt::Display for TreeGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "digraph J48Tree {{")?;
        for index in self.pre_order() {
            let node = &self.nodes[index];
            if let Some(parent) = node.parent {
                let edge = self.nodes[parent]
                    .edges
                    .iter()
                    .find(|e| e.target == index)
                    .map(|e| e.label.as_str())
                    .unwrap_or_default();
                writeln!(
                    f,
                    "{}->{} [label=\"{}\"]",
                    self.nodes[parent].name,
                    node.name,
                    escape(edge)
                )?;
            }
            if node.edges.is_empty() {
                writeln!(
                    f,
                    "{} [label=\"{}\" shape=box style=filled ]",
                    node.name,
                    escape(&node.label)
                )?;
            } else {
                writeln!(f, "{} [label=\"{}\" ]", node.name, escape(&node.label))?;
            }
        }
        writeln!(f, "}}")
    }
}
