//! Classification tree adapter: graph text in, typed leaves and paths out.

pub mod adapter;
pub mod condition;
pub mod error;
pub mod graph;

pub use adapter::{ClassificationTree, LeafDescriptor, NodeId, TreeNode};
pub use condition::{Condition, Operator, simplify};
pub use error::{TreeError, TreeResult};
pub use graph::TreeGraph;
