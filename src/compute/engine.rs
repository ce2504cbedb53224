//! A synchronous, single-threaded rollback (backward induction) engine.
use crate::compute::ledger::{Expected, Ledger, TreeError};
use crate::store::{ChanceNode, DecisionNode, NodeId, NodeRef, Registry};
use serde::{Serialize, Deserialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, instrument, trace};

/// Default tolerance for the probability-sum check on chance nodes.
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// How a decision node picks the branch that feeds its own aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Criterion {
    #[default]
    MinCost,
    MaxUtility,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalOptions {
    pub tolerance: f64,
    pub criterion: Criterion,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self { tolerance: DEFAULT_TOLERANCE, criterion: Criterion::default() }
    }
}

/// The branches of one decision node, side by side, in declared order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionOutcome {
    pub node: NodeId,
    pub branches: Vec<(NodeId, Expected)>,
    /// Branch selected under the configured criterion. `None` for a childless decision.
    pub preferred: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub root: NodeId,
    /// Aggregate at the root itself.
    pub expected: Expected,
    /// One entry per decision node reached, in visit order.
    pub decisions: Vec<DecisionOutcome>,
    pub ledger: Ledger,
}

impl EvaluationResult {
    /// Expected (cost, utility) of the decision branch labelled `label`.
    pub fn branch(&self, label: &str) -> Option<Expected> {
        self.decisions.iter()
            .flat_map(|d| d.branches.iter())
            .find(|(id, _)| id.as_str() == label)
            .map(|(_, value)| *value)
    }

    /// Branch label -> (cost, utility) across every decision node.
    pub fn branch_map(&self) -> BTreeMap<NodeId, Expected> {
        self.decisions.iter()
            .flat_map(|d| d.branches.iter().cloned())
            .collect()
    }

    pub fn decision(&self, id: &str) -> Option<&DecisionOutcome> {
        self.decisions.iter().find(|d| d.node.as_str() == id)
    }

    /// Preferred branch of the root decision, if the root is a decision node.
    pub fn preferred(&self) -> Option<&NodeId> {
        self.decision(self.root.as_str()).and_then(|d| d.preferred.as_ref())
    }
}

pub struct Engine<'a> {
    registry: &'a Registry,
    options: EvalOptions,
}

/// Work item of the explicit walk stack.
enum Frame {
    Enter(NodeId),
    Exit(NodeId),
}

/// Mutable state of one evaluation. Dropped when `evaluate` returns.
#[derive(Default)]
struct Walk {
    ledger: Ledger,
    visiting: HashSet<NodeId>, // For cycle detection
    path: Vec<NodeId>,
    decisions: Vec<DecisionOutcome>,
}

impl<'a> Engine<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry, options: EvalOptions::default() }
    }

    pub fn with_options(registry: &'a Registry, options: EvalOptions) -> Self {
        Self { registry, options }
    }

    pub fn options(&self) -> &EvalOptions { &self.options }

    /// Rolls the tree back from its terminals to `root`.
    ///
    /// Every branch is expanded in declared child order. Any malformed node aborts the whole
    /// evaluation; no partial result is returned. The walk keeps its own frame stack, so tree
    /// depth is bounded by memory, not by the thread's call stack.
    #[instrument(level = "debug", skip(self), fields(nodes = self.registry.count()))]
    pub fn evaluate(&self, root: &str) -> Result<EvaluationResult, TreeError> {
        check_tolerance(self.options.tolerance)?;

        let mut walk = Walk::default();
        let mut stack = vec![Frame::Enter(NodeId::from(root))];

        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Enter(id) => self.enter(id, &mut walk, &mut stack)?,
                Frame::Exit(id) => self.exit(id, &mut walk)?,
            }
        }

        let expected = walk.ledger.get(root)
            .ok_or_else(|| TreeError::UnknownNode { id: root.into() })?;
        debug!(cost = expected.cost, utility = expected.utility, "rolled back");

        Ok(EvaluationResult {
            root: root.into(),
            expected,
            decisions: walk.decisions,
            ledger: walk.ledger,
        })
    }

    /// First arrival at a node: validate it, then schedule its children ahead of its own `Exit`.
    fn enter(&self, id: NodeId, walk: &mut Walk, stack: &mut Vec<Frame>) -> Result<(), TreeError> {
        // Reached through another parent already.
        if walk.ledger.get(id.as_str()).is_some() {
            return Ok(());
        }
        // If we encounter a node currently on the walk's path, we've found a cycle.
        if walk.visiting.contains(id.as_str()) {
            let mut path = walk.path.clone();
            path.push(id.clone());
            return Err(TreeError::CycleDetected { id, path });
        }

        let node = self.registry.lookup(id.as_str())?;
        let children = match node {
            NodeRef::Terminal(t) => {
                let value = Expected::new(t.cost, t.utility);
                trace!(node = id.as_str(), kind = "terminal", cost = value.cost, utility = value.utility);
                walk.ledger.insert(id, value);
                return Ok(());
            }
            NodeRef::Chance(c) => {
                check_chance(id.as_str(), c, self.options.tolerance)?;
                &c.children
            }
            NodeRef::Decision(d) => &d.children,
        };
        self.check_children(id.as_str(), children)?;

        walk.visiting.insert(id.clone());
        walk.path.push(id.clone());
        stack.push(Frame::Exit(id));
        // Reversed so the first declared child is popped first.
        stack.extend(children.iter().rev().cloned().map(Frame::Enter));
        Ok(())
    }

    /// Every child of `id` is in the ledger by now: fold them into the node's own value.
    fn exit(&self, id: NodeId, walk: &mut Walk) -> Result<(), TreeError> {
        let node = self.registry.lookup(id.as_str())?;
        let value = match node {
            NodeRef::Terminal(t) => Expected::new(t.cost, t.utility),
            NodeRef::Chance(c) => roll_back_chance(c, &walk.ledger)?,
            NodeRef::Decision(d) => {
                let (value, outcome) = self.resolve_decision(id.as_str(), d, &walk.ledger)?;
                walk.decisions.push(outcome);
                value
            }
        };

        walk.path.pop();
        walk.visiting.remove(id.as_str());
        trace!(node = id.as_str(), kind = %node.kind(), cost = value.cost, utility = value.utility);
        walk.ledger.insert(id, value);
        Ok(())
    }

    fn resolve_decision(
        &self,
        id: &str,
        node: &DecisionNode,
        ledger: &Ledger,
    ) -> Result<(Expected, DecisionOutcome), TreeError> {
        let branches = node.children.iter()
            .map(|child| Ok((child.clone(), settled(ledger, child)?)))
            .collect::<Result<Vec<_>, TreeError>>()?;

        let preferred = preferred_branch(&branches, self.options.criterion);
        let own = Expected::new(node.cost, node.utility);
        let expected = match preferred {
            Some(i) => own + branches[i].1,
            None => own,
        };
        let preferred = preferred.map(|i| branches[i].0.clone());
        debug!(node = id, branches = branches.len(), preferred = ?preferred, "decision resolved");

        Ok((expected, DecisionOutcome { node: id.into(), branches, preferred }))
    }

    /// Resolves every child before anything below `parent` is computed.
    fn check_children(&self, parent: &str, children: &[NodeId]) -> Result<(), TreeError> {
        for child in children {
            if let NodeRef::Decision(_) = self.registry.lookup(child.as_str())? {
                return Err(TreeError::NestedDecision { parent: parent.into(), child: child.clone() });
            }
        }
        Ok(())
    }
}

fn roll_back_chance(node: &ChanceNode, ledger: &Ledger) -> Result<Expected, TreeError> {
    let mut total = Expected::new(node.cost, node.utility);
    for (child, &p) in node.children.iter().zip(&node.probabilities) {
        total += settled(ledger, child)?.weighted(p);
    }
    Ok(total)
}

/// Value of a child whose frames have all been popped.
fn settled(ledger: &Ledger, child: &NodeId) -> Result<Expected, TreeError> {
    ledger.get(child.as_str()).ok_or_else(|| TreeError::UnknownNode { id: child.clone() })
}

/// The probability-sum tolerance must be a finite, non-negative number.
pub(crate) fn check_tolerance(tolerance: f64) -> Result<(), TreeError> {
    if tolerance.is_finite() && tolerance >= 0.0 {
        Ok(())
    } else {
        Err(TreeError::InvalidTolerance { tolerance })
    }
}

/// Shape checks for a chance node: pairing, range, and sum within `tolerance`.
pub(crate) fn check_chance(id: &str, node: &ChanceNode, tolerance: f64) -> Result<(), TreeError> {
    if node.children.len() != node.probabilities.len() {
        return Err(TreeError::ProbabilityMismatch {
            id: id.into(),
            children: node.children.len(),
            probabilities: node.probabilities.len(),
        });
    }
    if let Some((index, &value)) = node.probabilities.iter()
        .enumerate()
        .find(|(_, p)| !p.is_finite() || **p < 0.0 || **p > 1.0)
    {
        return Err(TreeError::ProbabilityOutOfRange { id: id.into(), index, value });
    }
    let sum: f64 = node.probabilities.iter().sum();
    // Written as a negated `<=` so a NaN tolerance can never accept a bad sum.
    if !((sum - 1.0).abs() <= tolerance) {
        return Err(TreeError::ProbabilitySum { id: id.into(), sum });
    }
    Ok(())
}

/// Index of the best branch; ties keep the first declared.
fn preferred_branch(branches: &[(NodeId, Expected)], criterion: Criterion) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, (_, value)) in branches.iter().enumerate() {
        let better = match best {
            None => true,
            Some(b) => match criterion {
                Criterion::MinCost => value.cost < branches[b].1.cost,
                Criterion::MaxUtility => value.utility > branches[b].1.utility,
            },
        };
        if better {
            best = Some(i);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const EMPTY: [&str; 0] = [];

    fn two_branch_tree() -> Registry {
        // d1 -> {treat (cost 100) -> 0.3 bad / 0.7 good, wait -> 0.5 bad / 0.5 good}
        let mut reg = Registry::new();
        reg.insert_decision("d1", 0.0, 0.0, ["treat", "wait"])
            .insert_chance("treat", 100.0, 0.0, ["bad_t", "good_t"], vec![0.3, 0.7])
            .insert_chance("wait", 0.0, 0.0, ["bad_w", "good_w"], vec![0.5, 0.5])
            .insert_terminal("bad_t", 1000.0, 0.2)
            .insert_terminal("good_t", 0.0, 1.0)
            .insert_terminal("bad_w", 1000.0, 0.2)
            .insert_terminal("good_w", 0.0, 1.0);
        reg
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-9, "expected {}, got {}", expected, actual);
    }

    #[test]
    fn test_terminal_root_is_base_case() {
        let mut reg = Registry::new();
        reg.insert_terminal("t", 427577.0, 0.25);
        let res = Engine::new(&reg).evaluate("t").unwrap();
        assert_eq!(res.expected, Expected::new(427577.0, 0.25));
        assert!(res.decisions.is_empty());
        assert_eq!(res.ledger.len(), 1);
    }

    #[test]
    fn test_single_child_chance_adds_own_values() {
        let mut reg = Registry::new();
        reg.insert_chance("c", 10.0, 0.5, ["t"], vec![1.0])
            .insert_terminal("t", 90.0, 0.25);
        let res = Engine::new(&reg).evaluate("c").unwrap();
        assert_eq!(res.expected, Expected::new(100.0, 0.75));
    }

    #[test]
    fn test_decision_reports_each_branch() {
        let reg = two_branch_tree();
        let res = Engine::new(&reg).evaluate("d1").unwrap();

        let treat = res.branch("treat").unwrap();
        let wait = res.branch("wait").unwrap();
        assert_close(treat.cost, 100.0 + 0.3 * 1000.0);
        assert_close(treat.utility, 0.3 * 0.2 + 0.7);
        assert_close(wait.cost, 500.0);
        assert_close(wait.utility, 0.6);

        let outcome = res.decision("d1").unwrap();
        let labels: Vec<&str> = outcome.branches.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(labels, vec!["treat", "wait"]);

        // MinCost picks the cheaper branch for the root aggregate.
        assert_eq!(res.preferred().map(NodeId::as_str), Some("treat"));
        assert_eq!(res.expected, treat);
        assert_eq!(res.branch_map().len(), 2);
    }

    #[test]
    fn test_max_utility_criterion_and_decision_own_values() {
        let mut reg = two_branch_tree();
        reg.decisions.get_mut("d1").unwrap().cost = 7.0;
        let options = EvalOptions { criterion: Criterion::MaxUtility, ..Default::default() };
        let res = Engine::with_options(&reg, options).evaluate("d1").unwrap();

        assert_eq!(res.preferred().map(NodeId::as_str), Some("treat"));
        let treat = res.branch("treat").unwrap();
        assert_close(res.expected.cost, 7.0 + treat.cost);
        // Branch values do not include the decision's own cost.
        assert_close(treat.cost, 400.0);
    }

    #[test]
    fn test_ties_keep_first_declared_branch() {
        let mut reg = Registry::new();
        reg.insert_decision("d", 0.0, 0.0, ["x", "y"])
            .insert_terminal("x", 5.0, 0.0)
            .insert_terminal("y", 5.0, 0.0);
        let res = Engine::new(&reg).evaluate("d").unwrap();
        assert_eq!(res.preferred().map(NodeId::as_str), Some("x"));
    }

    #[test]
    fn test_childless_decision_aggregates_own_values() {
        let mut reg = Registry::new();
        reg.insert_decision("d", 3.0, 1.0, EMPTY);
        let res = Engine::new(&reg).evaluate("d").unwrap();
        assert_eq!(res.expected, Expected::new(3.0, 1.0));
        assert_eq!(res.decision("d").unwrap().preferred, None);
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let reg = two_branch_tree();
        let engine = Engine::new(&reg);
        let first = engine.evaluate("d1").unwrap();
        let second = engine.evaluate("d1").unwrap();
        assert_eq!(first, second);
        assert_eq!(reg, two_branch_tree());
    }

    #[rstest]
    #[case(vec![0.5, 0.4], 0.9)]
    #[case(vec![0.7, 0.7], 1.4)]
    #[case(vec![0.5, 0.5 - 1e-3], 0.999)]
    fn test_probability_sum_error(#[case] probabilities: Vec<f64>, #[case] expected_sum: f64) {
        let mut reg = Registry::new();
        reg.insert_chance("c", 0.0, 0.0, ["a", "b"], probabilities)
            .insert_terminal("a", 1.0, 0.0)
            .insert_terminal("b", 2.0, 0.0);
        match Engine::new(&reg).evaluate("c").unwrap_err() {
            TreeError::ProbabilitySum { id, sum } => {
                assert_eq!(id.as_str(), "c");
                assert!((sum - expected_sum).abs() < 1e-9);
            }
            other => panic!("Wrong error: {:?}", other),
        }
    }

    #[test]
    fn test_probability_sum_within_tolerance_is_accepted() {
        let mut reg = Registry::new();
        reg.insert_chance("c", 0.0, 0.0, ["a", "b"], vec![0.5, 0.5 + 1e-8])
            .insert_terminal("a", 1.0, 0.0)
            .insert_terminal("b", 1.0, 0.0);
        assert!(Engine::new(&reg).evaluate("c").is_ok());
    }

    #[test]
    fn test_probability_mismatch_error() {
        let mut reg = Registry::new();
        reg.insert_chance("c", 0.0, 0.0, ["a", "b"], vec![1.0])
            .insert_terminal("a", 1.0, 0.0)
            .insert_terminal("b", 2.0, 0.0);
        assert_eq!(
            Engine::new(&reg).evaluate("c").unwrap_err(),
            TreeError::ProbabilityMismatch { id: "c".into(), children: 2, probabilities: 1 }
        );
    }

    #[test]
    fn test_probability_out_of_range_error() {
        let mut reg = Registry::new();
        reg.insert_chance("c", 0.0, 0.0, ["a", "b"], vec![1.5, -0.5])
            .insert_terminal("a", 1.0, 0.0)
            .insert_terminal("b", 2.0, 0.0);
        assert_eq!(
            Engine::new(&reg).evaluate("c").unwrap_err(),
            TreeError::ProbabilityOutOfRange { id: "c".into(), index: 0, value: 1.5 }
        );
    }

    #[test]
    fn test_empty_chance_fails_sum_check() {
        let mut reg = Registry::new();
        reg.insert_chance("c", 0.0, 0.0, EMPTY, vec![]);
        assert!(matches!(
            Engine::new(&reg).evaluate("c").unwrap_err(),
            TreeError::ProbabilitySum { sum, .. } if sum == 0.0
        ));
    }

    #[test]
    fn test_unknown_decision_child_fails_before_any_branch() {
        // "treat" is fine but "missing" is not: no branch may be evaluated.
        let mut reg = two_branch_tree();
        reg.decisions.get_mut("d1").unwrap().children.push("missing".into());
        assert_eq!(
            Engine::new(&reg).evaluate("d1").unwrap_err(),
            TreeError::UnknownNode { id: "missing".into() }
        );
    }

    #[test]
    fn test_unknown_root() {
        let reg = two_branch_tree();
        assert_eq!(
            Engine::new(&reg).evaluate("nope").unwrap_err(),
            TreeError::UnknownNode { id: "nope".into() }
        );
    }

    #[test]
    fn test_nested_decision_rejected() {
        let mut reg = Registry::new();
        reg.insert_decision("d1", 0.0, 0.0, ["d2"])
            .insert_decision("d2", 0.0, 0.0, ["t"])
            .insert_terminal("t", 1.0, 0.0);
        assert_eq!(
            Engine::new(&reg).evaluate("d1").unwrap_err(),
            TreeError::NestedDecision { parent: "d1".into(), child: "d2".into() }
        );
    }

    #[test]
    fn test_ambiguous_child_propagates() {
        let mut reg = two_branch_tree();
        reg.insert_terminal("wait", 0.0, 0.0);
        assert!(matches!(
            Engine::new(&reg).evaluate("d1").unwrap_err(),
            TreeError::AmbiguousNode { id, .. } if id.as_str() == "wait"
        ));
    }

    #[test]
    fn test_cycle_detection() {
        // c1 -> c2 -> c1
        let mut reg = Registry::new();
        reg.insert_chance("c1", 0.0, 0.0, ["c2"], vec![1.0])
            .insert_chance("c2", 0.0, 0.0, ["c1"], vec![1.0]);
        match Engine::new(&reg).evaluate("c1").unwrap_err() {
            TreeError::CycleDetected { id, path } => {
                assert_eq!(id.as_str(), "c1");
                let path: Vec<&str> = path.iter().map(NodeId::as_str).collect();
                assert_eq!(path, vec!["c1", "c2", "c1"]);
            }
            other => panic!("Wrong error: {:?}", other),
        }
    }

    #[test]
    fn test_shared_subtree_is_not_a_cycle() {
        // Diamond: both chance branches end in the same terminal.
        let mut reg = Registry::new();
        reg.insert_chance("c", 0.0, 0.0, ["a", "b"], vec![0.5, 0.5])
            .insert_chance("a", 1.0, 0.0, ["t"], vec![1.0])
            .insert_chance("b", 3.0, 0.0, ["t"], vec![1.0])
            .insert_terminal("t", 10.0, 0.0);
        let res = Engine::new(&reg).evaluate("c").unwrap();
        assert_close(res.expected.cost, 12.0);
        assert_eq!(res.ledger.get("t"), Some(Expected::new(10.0, 0.0)));
    }

    #[test]
    fn test_ledger_records_every_chance_aggregate() {
        let reg = two_branch_tree();
        let res = Engine::new(&reg).evaluate("d1").unwrap();
        assert_eq!(res.ledger.len(), reg.count());
        assert_eq!(res.ledger.get("treat"), res.branch("treat"));
    }

    #[test]
    fn test_deep_chain_does_not_exhaust_the_call_stack() {
        const DEPTH: usize = 100_000;
        let mut reg = Registry::new();
        for i in 0..DEPTH {
            let next = if i + 1 == DEPTH { "end".to_string() } else { format!("c{}", i + 1) };
            reg.insert_chance(format!("c{}", i), 1.0, 0.0, [next], vec![1.0]);
        }
        reg.insert_terminal("end", 0.0, 0.0);

        let res = Engine::new(&reg).evaluate("c0").unwrap();
        assert_eq!(res.expected.cost, DEPTH as f64);
        assert_eq!(res.ledger.len(), DEPTH + 1);
    }

    #[rstest]
    #[case(f64::NAN)]
    #[case(-1e-6)]
    #[case(f64::INFINITY)]
    #[case(f64::NEG_INFINITY)]
    fn test_invalid_tolerance_rejected(#[case] tolerance: f64) {
        // [0.5, 0.4] would pass the sum check if the tolerance were ignored or infinite.
        let mut reg = Registry::new();
        reg.insert_chance("c", 0.0, 0.0, ["a", "b"], vec![0.5, 0.4])
            .insert_terminal("a", 1.0, 0.0)
            .insert_terminal("b", 2.0, 0.0);
        let options = EvalOptions { tolerance, ..Default::default() };
        match Engine::with_options(&reg, options).evaluate("c").unwrap_err() {
            TreeError::InvalidTolerance { tolerance: got } => {
                assert!(got.to_bits() == tolerance.to_bits());
            }
            other => panic!("Wrong error: {:?}", other),
        }
    }

    #[test]
    fn test_zero_tolerance_requires_exact_sum() {
        let mut reg = Registry::new();
        reg.insert_chance("c", 0.0, 0.0, ["a", "b"], vec![0.25, 0.75])
            .insert_terminal("a", 1.0, 0.0)
            .insert_terminal("b", 2.0, 0.0);
        let options = EvalOptions { tolerance: 0.0, ..Default::default() };
        assert!(Engine::with_options(&reg, options).evaluate("c").is_ok());
    }

    #[test]
    fn test_unknown_chance_child_fails_before_any_sibling() {
        // "loop" would raise CycleDetected if it were walked before "missing" is resolved.
        let mut reg = Registry::new();
        reg.insert_chance("c", 0.0, 0.0, ["loop", "missing"], vec![0.5, 0.5])
            .insert_chance("loop", 0.0, 0.0, ["c"], vec![1.0]);
        assert_eq!(
            Engine::new(&reg).evaluate("c").unwrap_err(),
            TreeError::UnknownNode { id: "missing".into() }
        );
    }
}
