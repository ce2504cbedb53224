use crate::compute::EvaluationResult;
use crate::store::{NodeId, NodeRef, Registry};
use std::collections::HashMap;
use std::fmt::Write;

/// Renders an evaluated tree from its root, one line per node, with rolled-back values.
pub fn format_trace(registry: &Registry, result: &EvaluationResult) -> String {
    let mut tracer = Tracer {
        registry,
        result,
        visited_at_level: HashMap::new(),
        output: String::new(),
    };

    let root = result.root.as_str();
    let _ = writeln!(tracer.output, "ROLLBACK TRACE for node '{}':", root);
    let _ = writeln!(tracer.output, "--------------------------------------------------");
    tracer.run(root);
    tracer.output
}

/// One pending line: node, depth, connector prefix and the incoming branch probability.
struct Pending {
    id: NodeId,
    level: usize,
    prefix: String,
    probability: Option<f64>,
}

struct Tracer<'a> {
    registry: &'a Registry,
    result: &'a EvaluationResult,
    visited_at_level: HashMap<String, usize>,
    output: String,
}

impl<'a> Tracer<'a> {
    /// Depth-first, pre-order, on an explicit stack so deep trees render without recursion.
    fn run(&mut self, root: &str) {
        let mut stack = vec![Pending { id: NodeId::from(root), level: 1, prefix: String::new(), probability: None }];
        while let Some(item) = stack.pop() {
            self.trace_node(item, &mut stack);
        }
    }

    fn trace_node(&mut self, item: Pending, stack: &mut Vec<Pending>) {
        let Pending { id, level, prefix, probability } = item;
        let id = id.as_str();
        let edge = probability.map(|p| format!("(p={:.4}) ", p)).unwrap_or_default();

        if let Some(&first_seen) = self.visited_at_level.get(id) {
            let _ = writeln!(self.output, "{}{}{} -> (Ref to L{})", prefix, edge, id, first_seen);
            return;
        }
        self.visited_at_level.insert(id.to_string(), level);

        let line_header = format!("{}[L{}] {}{}", edge, level, id, self.format_value(id));

        let registry = self.registry;
        match registry.lookup(id) {
            Ok(NodeRef::Terminal(t)) => {
                let _ = writeln!(self.output, "{}{} = Terminal({:.3})", prefix, line_header, t.cost);
            }
            Ok(NodeRef::Chance(c)) => {
                let _ = writeln!(self.output, "{}{} = Chance(own {:.3})", prefix, line_header, c.cost);
                push_children(stack, &prefix, &c.children, Some(&c.probabilities), level);
            }
            Ok(NodeRef::Decision(d)) => {
                let preferred = self.result.decision(id)
                    .and_then(|o| o.preferred.as_ref())
                    .map(|p| format!(" -> '{}'", p))
                    .unwrap_or_default();
                let _ = writeln!(self.output, "{}{} = Decision(own {:.3}){}", prefix, line_header, d.cost, preferred);
                push_children(stack, &prefix, &d.children, None, level);
            }
            Err(e) => {
                let _ = writeln!(self.output, "{}{} [Err: {}]", prefix, line_header, e);
            }
        }
    }

    fn format_value(&self, id: &str) -> String {
        match self.result.ledger.get(id) {
            Some(v) => format!(" [cost={:.3}, utility={:.3}]", v.cost, v.utility),
            None => " [?]".to_string(),
        }
    }

}

/// Schedules `children` so the first declared one is rendered next.
fn push_children(stack: &mut Vec<Pending>, prefix: &str, children: &[NodeId], probabilities: Option<&[f64]>, level: usize) {
    let stem = build_child_stem(prefix);
    for (i, child) in children.iter().enumerate().rev() {
        let connector = if i == children.len() - 1 { "`--" } else { "|--" };
        stack.push(Pending {
            id: child.clone(),
            level: level + 1,
            prefix: format!("{}{}", stem, connector),
            probability: probabilities.and_then(|ps| ps.get(i).copied()),
        });
    }
}

fn build_child_stem(current_prefix: &str) -> String {
    current_prefix.replace("`--", "   ").replace("|--", "|  ")
}
