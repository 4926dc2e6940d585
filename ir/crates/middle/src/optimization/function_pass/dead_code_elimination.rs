use std::collections::VecDeque;

use itertools::Itertools;
use rustc_hash::FxHashSet;
use tracing::{
    debug,
    error,
    trace,
};

use crate::{
    error::GraphError,
    optimization::{
        FunctionPass,
        Pass,
        PassOptions,
        PassResults,
    },
    Function,
    NodeRef,
};

/// The order in which queued dead nodes are removed.
///
/// Only the sequence of removals depends on it, never the set of removed nodes.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum WorklistOrder {
    #[default]
    Fifo,
    Lifo,
}

#[derive(Debug)]
struct Worklist {
    order: WorklistOrder,
    queue: VecDeque<NodeRef>,
}

impl Worklist {
    fn new(order: WorklistOrder) -> Self {
        Self {
            order,
            queue: VecDeque::new(),
        }
    }

    fn push(&mut self, node: NodeRef) {
        self.queue.push_back(node);
    }

    fn pop(&mut self) -> Option<NodeRef> {
        match self.order {
            WorklistOrder::Fifo => self.queue.pop_front(),
            WorklistOrder::Lifo => self.queue.pop_back(),
        }
    }
}

/// # Dead Code Elimination
///
/// Removes every node whose value can not reach the return value of the
/// function. Parameters and the return value itself are always kept.
///
/// ## How does this pass work?
///
/// All nodes without users, except for the roots, are put on a worklist.
/// Popping a node `n` from the worklist removes it from the function. Right
/// before that happens, each distinct operand `m` of `n` is inspected: if `n` is
/// the only user of `m` left, `m` becomes dead as soon as `n` is gone and is
/// queued as well.
///
/// The inspection has to happen *before* the removal, since removing `n` is
/// what drops it from the users of `m`. Operands referenced by several slots of
/// `n` are only inspected once.
///
/// A node is queued at most once per run. Queued and removed nodes are tracked
/// in a set, so no node is handed to [`Function::remove_node`] twice.
///
/// ## Example
///
/// ```text
/// fn test(p: bits[32]) -> bits[32] {
///     b: bits[32] = not(p)
///     a: bits[32] = neg(b)
///     c: bits[32] = identity(p)
///     r: bits[32] = add(c, p)
///     ret r
/// }
/// ```
///
/// `a` has no users and is removed first, which leaves `b` without users.
///
/// ```text
/// fn test(p: bits[32]) -> bits[32] {
///     c: bits[32] = identity(p)
///     r: bits[32] = add(c, p)
///     ret r
/// }
/// ```
///
/// ## Costs of this pass
///
/// Every live node is visited once for seeding and every removed node once
/// more, so a run terminates after at most as many removals as there are nodes.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct DeadCodeEliminationPass {
    order: WorklistOrder,
    removed: Vec<NodeRef>,
}

impl Pass for DeadCodeEliminationPass {
    fn name(&self) -> &'static str {
        "dead_code_elim"
    }
}

impl FunctionPass for DeadCodeEliminationPass {
    fn run_on_function(
        &mut self,
        function: &mut Function,
        _options: &PassOptions,
        _results: &mut PassResults,
    ) -> Result<bool, GraphError> {
        Ok(self.eliminate(function)? > 0)
    }
}

impl DeadCodeEliminationPass {
    pub fn new(order: WorklistOrder) -> Self {
        Self {
            order,
            removed: Vec::new(),
        }
    }

    /// Nodes removed by the last run, in removal order.
    pub fn removed_nodes(&self) -> &[NodeRef] {
        &self.removed
    }

    /// Removes all dead nodes from `function` and returns how many were removed.
    ///
    /// A [`GraphError`] means the graph was inconsistent to begin with. Removals
    /// that happened before the error are not rolled back.
    pub fn eliminate(&mut self, function: &mut Function) -> Result<usize, GraphError> {
        self.removed.clear();
        let mut worklist = Worklist::new(self.order);
        // Every node that was ever queued, including the ones removed since.
        let mut queued = FxHashSet::default();
        for node in function.nodes() {
            if function.users(node)?.is_empty() && is_removable(function, node) {
                queued.insert(node);
                worklist.push(node);
            }
        }
        trace!("Seeded worklist with {} dead nodes", queued.len());

        while let Some(node) = worklist.pop() {
            for operand in function.operands(node)?.iter().copied().unique() {
                if function.users(operand)?.len() == 1
                    && is_removable(function, operand)
                    && queued.insert(operand)
                {
                    worklist.push(operand);
                }
            }
            match function.remove_node(node) {
                Ok(removed) => debug!("Removing unused node {removed}"),
                Err(err) => {
                    error!("Dead node could not be removed: {err}");
                    return Err(err);
                }
            }
            self.removed.push(node);
        }

        debug!("Removed {} dead nodes", self.removed.len());
        Ok(self.removed.len())
    }
}

fn is_removable(function: &Function, node: NodeRef) -> bool {
    function.return_value() != Some(node) && !function.is_parameter(node)
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;
    use rustc_hash::FxHashSet;
    use tracing_test::traced_test;

    use super::{
        DeadCodeEliminationPass,
        WorklistOrder,
    };
    use crate::{
        analysis::liveness::LiveSet,
        node::Opcode,
        optimization::{
            FunctionPass,
            PassOptions,
            PassResults,
        },
        test::{
            assert_no_duplicates,
            create_random_function,
            create_test_function,
        },
        Function,
        NodeRef,
        Type,
        Verifier,
    };

    fn run(function: &mut Function) -> bool {
        DeadCodeEliminationPass::default()
            .run_on_function(function, &PassOptions::default(), &mut PassResults::default())
            .unwrap()
    }

    /// Params `x` and `y`, a live chain into the return value and a dead
    /// cluster that shares producers with it.
    fn create_mixed_function() -> Function {
        let ty = Type::bits(16);
        let mut function = Function::new("mixed");
        let x = function.add_param("x", ty.clone());
        let y = function.add_param("y", ty.clone());
        let three = function.add_literal(3i64);
        let s = function.add_op(Opcode::Add, ty.clone(), [x, y]).unwrap();
        let t = function.add_op(Opcode::Mul, ty.clone(), [s, three]).unwrap();
        let d1 = function.add_op(Opcode::Sub, ty.clone(), [s, x]).unwrap();
        let d2 = function.add_op(Opcode::And, ty.clone(), [d1, d1]).unwrap();
        let d3 = function.add_op(Opcode::Or, ty.clone(), [d2, t]).unwrap();
        function
            .add_op(Opcode::Tuple, Type::unit(), [d1, d3, three, three])
            .unwrap();
        function.add_op(Opcode::Not, ty.clone(), [three]).unwrap();
        function.add_literal(9i64);
        let ret = function.add_op(Opcode::Identity, ty, [t]).unwrap();
        function.set_return_value(Some(ret)).unwrap();
        function
    }

    #[test]
    #[traced_test]
    fn should_eliminate_unused_values() {
        let (mut function, nodes) = create_test_function();
        let mut pass = DeadCodeEliminationPass::default();
        assert_eq!(pass.eliminate(&mut function), Ok(2));
        assert_eq!(pass.removed_nodes(), &[nodes.a, nodes.b]);
        assert_eq!(function.nodes().collect_vec(), vec![nodes.p, nodes.c, nodes.r]);
        assert!(logs_contain("Removed 2 dead nodes"));
        assert_eq!(
            function.to_string(),
            "fn test(p: bits[32]) -> bits[32] {
    c: bits[32] = identity(p)
    r: bits[32] = add(c, p)
    ret r
}
"
        );
    }

    #[test]
    fn should_report_change() {
        let (mut function, _) = create_test_function();
        assert!(run(&mut function));
    }

    #[test]
    fn should_not_change_live_function() {
        let mut function = Function::new("live");
        let p = function.add_param("p", Type::bits(8));
        let r = function.add_op(Opcode::Neg, Type::bits(8), [p]).unwrap();
        function.set_return_value(Some(r)).unwrap();
        let mut pass = DeadCodeEliminationPass::default();
        assert_eq!(pass.eliminate(&mut function), Ok(0));
        assert!(pass.removed_nodes().is_empty());
        assert!(!run(&mut function));
        assert_eq!(function.len(), 2);
    }

    #[test]
    fn should_be_idempotent() {
        let mut function = create_mixed_function();
        assert!(run(&mut function));
        let snapshot = function.to_string();
        let mut pass = DeadCodeEliminationPass::default();
        assert_eq!(pass.eliminate(&mut function), Ok(0));
        assert_eq!(function.to_string(), snapshot);
    }

    #[test]
    fn should_inspect_duplicate_operand_once() {
        let ty = Type::bits(8);
        let mut function = Function::new("dup");
        let p = function.add_param("p", ty.clone());
        let d = function.add_op(Opcode::Neg, ty.clone(), [p]).unwrap();
        let e = function.add_op(Opcode::Add, ty.clone(), [d, d]).unwrap();
        let r = function.add_op(Opcode::Identity, ty, [p]).unwrap();
        function.set_return_value(Some(r)).unwrap();

        let mut pass = DeadCodeEliminationPass::default();
        assert_eq!(pass.eliminate(&mut function), Ok(2));
        assert_eq!(pass.removed_nodes(), &[e, d]);
        assert_eq!(function.nodes().collect_vec(), vec![p, r]);
    }

    #[test]
    fn should_queue_shared_operand_only_after_last_user() {
        let ty = Type::bits(8);
        let mut function = Function::new("diamond");
        let x = function.add_param("x", ty.clone());
        let m = function.add_op(Opcode::Neg, ty.clone(), [x]).unwrap();
        let a = function.add_op(Opcode::Not, ty.clone(), [m]).unwrap();
        let b = function.add_op(Opcode::Not, ty.clone(), [m]).unwrap();
        let c = function.add_op(Opcode::Add, ty, [a, b]).unwrap();

        let mut pass = DeadCodeEliminationPass::default();
        assert_eq!(pass.eliminate(&mut function), Ok(4));
        assert_eq!(pass.removed_nodes(), &[c, a, b, m]);
        assert_no_duplicates(pass.removed_nodes());
        assert_eq!(function.nodes().collect_vec(), vec![x]);
    }

    #[test]
    fn should_keep_unused_params_and_return_value() {
        let ty = Type::bits(8);
        let mut function = Function::new("roots");
        let x = function.add_param("x", ty.clone());
        let y = function.add_param("y", ty.clone());
        let unused = function.add_op(Opcode::Neg, ty.clone(), [y]).unwrap();
        let lit = function.add_literal(1i64);
        function.set_return_value(Some(lit)).unwrap();

        let mut pass = DeadCodeEliminationPass::default();
        assert_eq!(pass.eliminate(&mut function), Ok(1));
        assert_eq!(pass.removed_nodes(), &[unused]);
        assert_eq!(function.nodes().collect_vec(), vec![x, y, lit]);
        assert_eq!(function.params(), &[x, y]);
        assert_eq!(function.return_value(), Some(lit));
    }

    #[test]
    fn should_remove_everything_but_params_without_return_value() {
        let mut function = create_mixed_function();
        function.set_return_value(None).unwrap();
        let params = function.params().to_vec();
        assert!(run(&mut function));
        assert_eq!(function.nodes().collect_vec(), params);
    }

    #[test]
    fn should_remove_exactly_the_unreachable_nodes() {
        let mut function = create_mixed_function();
        let live_set = LiveSet::compute(&function);
        let expected_dead = live_set.dead_nodes().to_vec();
        assert_eq!(expected_dead.len(), 6);

        let mut pass = DeadCodeEliminationPass::default();
        assert_eq!(pass.eliminate(&mut function), Ok(expected_dead.len()));
        assert_no_duplicates(pass.removed_nodes());
        for node in &expected_dead {
            assert!(!function.contains(*node));
        }
        for node in function.nodes() {
            assert!(live_set.is_live(node));
            let is_root = function.is_parameter(node) || function.return_value() == Some(node);
            assert!(is_root || !function.users(node).unwrap().is_empty());
        }
        assert!(Verifier::new(&function).verify().is_empty());
    }

    #[test]
    fn should_remove_same_nodes_in_any_order() {
        let removed_with = |order| {
            let mut function = create_mixed_function();
            let mut pass = DeadCodeEliminationPass::new(order);
            pass.eliminate(&mut function).unwrap();
            assert_no_duplicates(pass.removed_nodes());
            (pass.removed_nodes().len(), function.to_string())
        };
        let (fifo_count, fifo_function) = removed_with(WorklistOrder::Fifo);
        let (lifo_count, lifo_function) = removed_with(WorklistOrder::Lifo);
        assert_eq!(fifo_count, 6);
        assert_eq!(fifo_count, lifo_count);
        assert_eq!(fifo_function, lifo_function);
    }

    #[test]
    fn should_remove_same_handles_in_any_order() {
        let mut fifo_function = create_mixed_function();
        let mut lifo_function = fifo_function.clone();
        let mut fifo = DeadCodeEliminationPass::new(WorklistOrder::Fifo);
        let mut lifo = DeadCodeEliminationPass::new(WorklistOrder::Lifo);
        fifo.eliminate(&mut fifo_function).unwrap();
        lifo.eliminate(&mut lifo_function).unwrap();
        assert_ne!(fifo.removed_nodes(), lifo.removed_nodes());
        let fifo_removed = fifo.removed_nodes().iter().copied().collect::<FxHashSet<NodeRef>>();
        let lifo_removed = lifo.removed_nodes().iter().copied().collect::<FxHashSet<NodeRef>>();
        assert_eq!(fifo_removed, lifo_removed);
    }

    #[test]
    fn should_never_revive_removed_handles() {
        let (mut function, nodes) = create_test_function();
        run(&mut function);
        let fresh = function.add_literal(0i64);
        assert_ne!(fresh, nodes.a);
        assert_ne!(fresh, nodes.b);
        assert!(!function.contains(nodes.a));
        assert!(!function.contains(nodes.b));
    }

    #[test]
    fn should_remove_wide_fan_of_dead_nodes() {
        let ty = Type::bits(8);
        let mut function = Function::new("wide");
        let p = function.add_param("p", ty.clone());
        for _ in 0..20_000 {
            function.add_op(Opcode::Neg, ty.clone(), [p]).unwrap();
        }
        let r = function.add_op(Opcode::Identity, ty, [p]).unwrap();
        function.set_return_value(Some(r)).unwrap();

        let mut pass = DeadCodeEliminationPass::default();
        assert_eq!(pass.eliminate(&mut function), Ok(20_000));
        assert_eq!(function.nodes().collect_vec(), vec![p, r]);
        assert_eq!(function.users(p).unwrap().iter().copied().collect_vec(), vec![r]);
    }

    #[test]
    fn should_agree_with_liveness_on_generated_functions() {
        for seed in 0..500 {
            let function = create_random_function(seed);
            let live_set = LiveSet::compute(&function);
            let expected = live_set.dead_nodes().iter().copied().collect::<FxHashSet<_>>();

            for order in [WorklistOrder::Fifo, WorklistOrder::Lifo] {
                let mut function = function.clone();
                let mut pass = DeadCodeEliminationPass::new(order);
                assert_eq!(pass.eliminate(&mut function), Ok(expected.len()), "seed {seed}");
                assert_no_duplicates(pass.removed_nodes());
                let removed = pass.removed_nodes().iter().copied().collect::<FxHashSet<_>>();
                assert_eq!(removed, expected, "seed {seed}, {order:?}");
                assert!(function.nodes().all(|node| live_set.is_live(node)));
                assert!(Verifier::new(&function).verify().is_empty(), "seed {seed}");
            }
        }
    }
}
