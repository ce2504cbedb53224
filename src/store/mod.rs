//! Node registry: the decision, chance and terminal maps of one tree.
pub mod registry;
pub mod types;

pub use registry::Registry;
pub use types::{ChanceNode, DecisionNode, NodeId, NodeKind, NodeRef, TerminalNode};
