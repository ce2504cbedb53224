use serde::{Serialize, Deserialize};
use std::borrow::Borrow;
use std::fmt;

/// Identifier of a node, unique within one registry (e.g. `"d1"`, `"Diagnostic Test"`).
///
/// For child nodes of a decision the identifier doubles as the branch label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str { &self.0 }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self { Self(s.to_string()) }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self { Self(s) }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// A point where one of several mutually exclusive strategies is chosen.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DecisionNode {
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub utility: f64,
    pub children: Vec<NodeId>,
}

/// A probabilistic branch point. `children[i]` occurs with `probabilities[i]`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChanceNode {
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub utility: f64,
    pub children: Vec<NodeId>,
    pub probabilities: Vec<f64>,
}

/// An absorbing outcome.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TerminalNode {
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub utility: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Decision,
    Chance,
    Terminal,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeKind::Decision => "decision",
            NodeKind::Chance => "chance",
            NodeKind::Terminal => "terminal",
        };
        f.write_str(s)
    }
}

/// A borrowed view of a node resolved through the registry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeRef<'a> {
    Decision(&'a DecisionNode),
    Chance(&'a ChanceNode),
    Terminal(&'a TerminalNode),
}

impl<'a> NodeRef<'a> {
    pub fn kind(&self) -> NodeKind {
        match *self {
            NodeRef::Decision(_) => NodeKind::Decision,
            NodeRef::Chance(_) => NodeKind::Chance,
            NodeRef::Terminal(_) => NodeKind::Terminal,
        }
    }

    /// Cost incurred at the node itself, independent of its children.
    pub fn cost(&self) -> f64 {
        match *self {
            NodeRef::Decision(n) => n.cost,
            NodeRef::Chance(n) => n.cost,
            NodeRef::Terminal(n) => n.cost,
        }
    }

    pub fn utility(&self) -> f64 {
        match *self {
            NodeRef::Decision(n) => n.utility,
            NodeRef::Chance(n) => n.utility,
            NodeRef::Terminal(n) => n.utility,
        }
    }

    pub fn children(&self) -> &'a [NodeId] {
        match *self {
            NodeRef::Decision(n) => &n.children,
            NodeRef::Chance(n) => &n.children,
            NodeRef::Terminal(_) => &[],
        }
    }

    pub fn probabilities(&self) -> Option<&'a [f64]> {
        match *self {
            NodeRef::Chance(n) => Some(&n.probabilities),
            _ => None,
        }
    }
}
