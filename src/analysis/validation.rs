//! Whole-tree structural checks, run without computing any cost.
use crate::analysis::topology;
use crate::compute::engine::{check_chance, check_tolerance, DEFAULT_TOLERANCE};
use crate::compute::ledger::TreeError;
use crate::store::{NodeKind, NodeRef, Registry};

/// Collects every defect reachable from a root, where `Engine::evaluate` stops at the first.
///
/// Useful when a registry is assembled by hand (or loaded from JSON) and all of its problems
/// should be reported in one pass.
pub struct Validator<'a> {
    registry: &'a Registry,
    tolerance: f64,
}

impl<'a> Validator<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry, tolerance: DEFAULT_TOLERANCE }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// # Returns
    /// - `Ok(())` if the tree under `root` can be evaluated.
    /// - `Err(Vec<TreeError>)` with lookup errors first (discovery order), then chance-node
    ///   shape and nesting errors, then one `Cycle` per cycle.
    /// - `Err` holding only `InvalidTolerance` if the tolerance itself is unusable.
    pub fn validate(&self, root: &str) -> Result<(), Vec<TreeError>> {
        check_tolerance(self.tolerance).map_err(|e| vec![e])?;

        let (tree, mut errors) = topology::reachable(self.registry, root);

        for idx in tree.graph.node_indices() {
            let id = &tree.graph[idx];
            let Ok(node) = self.registry.lookup(id.as_str()) else { continue };

            if let NodeRef::Chance(chance) = node {
                if let Err(e) = check_chance(id.as_str(), chance, self.tolerance) {
                    errors.push(e);
                }
            }
            for child in node.children() {
                if let Ok(NodeKind::Decision) = self.registry.kind_of(child.as_str()) {
                    errors.push(TreeError::NestedDecision { parent: id.clone(), child: child.clone() });
                }
            }
        }

        errors.extend(topology::cycles(&tree).into_iter().map(|members| TreeError::Cycle { members }));

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
