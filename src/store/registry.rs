use super::types::*;
use crate::compute::ledger::TreeError;
use serde::{Serialize, Deserialize};
use std::collections::HashMap;

/// The three node maps of one tree, keyed by node id.
///
/// Populated once before evaluation and only read afterwards. An id must live in
/// exactly one of the maps; `lookup` enforces this instead of the inserts so that
/// registries supplied wholesale (e.g. from JSON) get the same checks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default)]
    pub decisions: HashMap<NodeId, DecisionNode>,
    #[serde(default)]
    pub chances: HashMap<NodeId, ChanceNode>,
    #[serde(default)]
    pub terminals: HashMap<NodeId, TerminalNode>,
}

impl Registry {
    pub fn new() -> Self { Self::default() }

    pub fn from_maps(
        decisions: HashMap<NodeId, DecisionNode>,
        chances: HashMap<NodeId, ChanceNode>,
        terminals: HashMap<NodeId, TerminalNode>,
    ) -> Self {
        Self { decisions, chances, terminals }
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn count(&self) -> usize {
        self.decisions.len() + self.chances.len() + self.terminals.len()
    }

    pub fn insert_decision<I, S>(&mut self, id: impl Into<NodeId>, cost: f64, utility: f64, children: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        let children = children.into_iter().map(Into::into).collect();
        self.decisions.insert(id.into(), DecisionNode { cost, utility, children });
        self
    }

    pub fn insert_chance<I, S>(
        &mut self,
        id: impl Into<NodeId>,
        cost: f64,
        utility: f64,
        children: I,
        probabilities: Vec<f64>,
    ) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        let children = children.into_iter().map(Into::into).collect();
        self.chances.insert(id.into(), ChanceNode { cost, utility, children, probabilities });
        self
    }

    pub fn insert_terminal(&mut self, id: impl Into<NodeId>, cost: f64, utility: f64) -> &mut Self {
        self.terminals.insert(id.into(), TerminalNode { cost, utility });
        self
    }

    /// Every kind `id` is registered under, in decision/chance/terminal order.
    fn kinds_of(&self, id: &str) -> Vec<NodeKind> {
        let mut kinds = Vec::with_capacity(1);
        if self.decisions.contains_key(id) { kinds.push(NodeKind::Decision); }
        if self.chances.contains_key(id) { kinds.push(NodeKind::Chance); }
        if self.terminals.contains_key(id) { kinds.push(NodeKind::Terminal); }
        kinds
    }

    pub fn contains(&self, id: &str) -> bool {
        !self.kinds_of(id).is_empty()
    }

    pub fn kind_of(&self, id: &str) -> Result<NodeKind, TreeError> {
        self.lookup(id).map(|node| node.kind())
    }

    /// Resolves `id` to exactly one node.
    pub fn lookup(&self, id: &str) -> Result<NodeRef<'_>, TreeError> {
        let kinds = self.kinds_of(id);
        let node = match kinds.as_slice() {
            [] => None,
            [NodeKind::Decision] => self.decisions.get(id).map(NodeRef::Decision),
            [NodeKind::Chance] => self.chances.get(id).map(NodeRef::Chance),
            [NodeKind::Terminal] => self.terminals.get(id).map(NodeRef::Terminal),
            _ => return Err(TreeError::AmbiguousNode { id: id.into(), kinds: kinds.clone() }),
        };
        node.ok_or_else(|| TreeError::UnknownNode { id: id.into() })
    }

    /// All registered ids, sorted for stable output.
    pub fn ids(&self) -> Vec<&NodeId> {
        let mut ids: Vec<&NodeId> = self.decisions.keys()
            .chain(self.chances.keys())
            .chain(self.terminals.keys())
            .collect();
        ids.sort();
        ids
    }
}
