use crate::compute::ledger::TreeError;
use crate::store::{NodeId, Registry};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, VecDeque};

/// The part of a registry reachable from one root, as a petgraph digraph.
///
/// Node weights are node ids; edge weights are the branch probability for chance edges and
/// `None` for decision edges. Node indices follow breadth-first discovery order.
#[derive(Debug, Clone, Default)]
pub struct TreeGraph {
    pub graph: DiGraph<NodeId, Option<f64>>,
    index: HashMap<NodeId, NodeIndex>,
}

impl TreeGraph {
    pub fn node_index(&self, id: &str) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    pub fn node_count(&self) -> usize { self.graph.node_count() }

    fn intern(&mut self, id: &NodeId) -> (NodeIndex, bool) {
        if let Some(&idx) = self.index.get(id) {
            return (idx, false);
        }
        let idx = self.graph.add_node(id.clone());
        self.index.insert(id.clone(), idx);
        (idx, true)
    }
}

/// Walks everything reachable from `root` breadth-first.
///
/// Lookup failures do not stop the walk: the failing id stays in the graph as a leaf and the
/// error is returned alongside, once per id.
pub fn reachable(registry: &Registry, root: &str) -> (TreeGraph, Vec<TreeError>) {
    let mut tree = TreeGraph::default();
    let mut errors = Vec::new();
    let mut queue = VecDeque::new();

    let (root_idx, _) = tree.intern(&NodeId::from(root));
    queue.push_back(root_idx);

    while let Some(idx) = queue.pop_front() {
        let id = tree.graph[idx].clone();
        let node = match registry.lookup(id.as_str()) {
            Ok(node) => node,
            Err(e) => {
                errors.push(e);
                continue;
            }
        };

        let probabilities = node.probabilities();
        for (i, child) in node.children().iter().enumerate() {
            let (child_idx, is_new) = tree.intern(child);
            let weight = probabilities.and_then(|p| p.get(i).copied());
            tree.graph.add_edge(idx, child_idx, weight);
            if is_new {
                queue.push_back(child_idx);
            }
        }
    }

    (tree, errors)
}

/// Every cycle in the graph, as the sorted ids of its strongly connected component.
pub fn cycles(tree: &TreeGraph) -> Vec<Vec<NodeId>> {
    let mut found: Vec<Vec<NodeId>> = tarjan_scc(&tree.graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || tree.graph.contains_edge(scc[0], scc[0]))
        .map(|scc| {
            let mut ids: Vec<NodeId> = scc.into_iter().map(|i| tree.graph[i].clone()).collect();
            ids.sort();
            ids
        })
        .collect();
    found.sort();
    found
}

/// Longest root-to-leaf edge count. `None` if the graph is empty or cyclic.
pub fn depth(tree: &TreeGraph) -> Option<usize> {
    let order = petgraph::algo::toposort(&tree.graph, None).ok()?;
    let mut depth = vec![0usize; tree.graph.node_count()];
    for idx in order {
        for child in tree.graph.neighbors(idx) {
            depth[child.index()] = depth[child.index()].max(depth[idx.index()] + 1);
        }
    }
    depth.into_iter().max()
}
