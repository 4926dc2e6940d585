use petgraph::{
    graphmap::DiGraphMap,
    visit::Dfs,
};
use rustc_hash::FxHashSet;

use crate::{
    Function,
    NodeRef,
};

/// Edges point from a consumer to each of its operands.
pub type OperandGraph = DiGraphMap<NodeRef, ()>;

/// The nodes of a function that can affect its result.
///
/// A node is live iff it is a parameter, the return value, or reachable
/// through operand edges from one of those. Everything else is dead code.
#[derive(Debug, Clone, Default)]
pub struct LiveSet {
    live: FxHashSet<NodeRef>,
    dead: Vec<NodeRef>,
}

impl LiveSet {
    pub fn compute(function: &Function) -> Self {
        let graph = operand_graph(function);
        let mut live = FxHashSet::default();
        let mut dfs = Dfs::empty(&graph);
        let roots = function
            .params()
            .iter()
            .copied()
            .chain(function.return_value());
        for root in roots {
            if !graph.contains_node(root) {
                continue;
            }
            dfs.move_to(root);
            while let Some(node) = dfs.next(&graph) {
                live.insert(node);
            }
        }
        let dead = function
            .nodes()
            .filter(|node| !live.contains(node))
            .collect();
        Self { live, dead }
    }

    pub fn is_live(&self, node: NodeRef) -> bool {
        self.live.contains(&node)
    }

    /// Dead nodes in insertion order.
    pub fn dead_nodes(&self) -> &[NodeRef] {
        &self.dead
    }
}

pub fn operand_graph(function: &Function) -> OperandGraph {
    let mut graph = OperandGraph::new();
    for node in function.nodes() {
        graph.add_node(node);
        let Ok(operands) = function.operands(node) else {
            continue;
        };
        for operand in operands.iter().copied() {
            graph.add_edge(node, operand, ());
        }
    }
    graph
}
