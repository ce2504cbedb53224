//! ledger.rs
//! Rolled-back (cost, utility) values per node, and the evaluation error taxonomy.

use crate::store::{NodeId, NodeKind};
use serde::{Serialize, Deserialize};
use std::collections::HashMap;
use std::ops::{Add, AddAssign};

pub use self::error::TreeError;
mod error {
    use super::*;
    use thiserror::Error;

    /// A malformed tree. None of these are retryable: the caller fixes the registry and re-runs.
    #[derive(Error, Debug, Clone, PartialEq)]
    pub enum TreeError {
        #[error("Unknown node '{id}'")]
        UnknownNode { id: NodeId },
        #[error("Node '{id}' is registered as more than one kind: {kinds:?}")]
        AmbiguousNode { id: NodeId, kinds: Vec<NodeKind> },
        #[error("Chance node '{id}' has {children} children but {probabilities} probabilities")]
        ProbabilityMismatch { id: NodeId, children: usize, probabilities: usize },
        #[error("Probabilities of chance node '{id}' sum to {sum}, expected 1.0")]
        ProbabilitySum { id: NodeId, sum: f64 },
        #[error("Probability {value} of branch {index} at chance node '{id}' is outside [0, 1]")]
        ProbabilityOutOfRange { id: NodeId, index: usize, value: f64 },
        #[error("Decision node '{child}' cannot be a child of '{parent}'")]
        NestedDecision { parent: NodeId, child: NodeId },
        /// Raised by the evaluator. `path` runs from the root to the repeated node `id`.
        #[error("Cycle detected at node '{id}' (path: {path:?})")]
        CycleDetected { id: NodeId, path: Vec<NodeId> },
        /// Raised by the validator: the sorted members of one strongly connected component.
        #[error("Cycle among nodes {members:?}")]
        Cycle { members: Vec<NodeId> },
        #[error("Probability-sum tolerance {tolerance} must be finite and non-negative")]
        InvalidTolerance { tolerance: f64 },
    }
}

/// Expected cost and utility of a subtree.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Expected {
    pub cost: f64,
    pub utility: f64,
}

impl Expected {
    pub fn new(cost: f64, utility: f64) -> Self { Self { cost, utility } }

    /// Scales both components by a branch probability.
    #[inline(always)]
    pub fn weighted(self, probability: f64) -> Self {
        Self { cost: self.cost * probability, utility: self.utility * probability }
    }
}

impl Add for Expected {
    type Output = Expected;
    fn add(self, rhs: Expected) -> Expected {
        Expected { cost: self.cost + rhs.cost, utility: self.utility + rhs.utility }
    }
}

impl AddAssign for Expected {
    fn add_assign(&mut self, rhs: Expected) {
        self.cost += rhs.cost;
        self.utility += rhs.utility;
    }
}

impl From<(f64, f64)> for Expected {
    fn from((cost, utility): (f64, f64)) -> Self { Self { cost, utility } }
}

impl From<Expected> for (f64, f64) {
    fn from(e: Expected) -> Self { (e.cost, e.utility) }
}

/// Rolled-back value of every node visited during one evaluation.
/// Also serves as the memo for subtrees reached through more than one parent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    values: HashMap<NodeId, Expected>,
}

impl Ledger {
    pub fn new() -> Self { Self::default() }

    #[inline(always)]
    pub fn get(&self, id: &str) -> Option<Expected> {
        self.values.get(id).copied()
    }

    #[inline(always)]
    pub fn insert(&mut self, id: NodeId, value: Expected) {
        self.values.insert(id, value);
    }

    pub fn len(&self) -> usize { self.values.len() }
    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &Expected)> {
        self.values.iter()
    }
}
