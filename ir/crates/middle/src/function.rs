use std::fmt::{
    Display,
    Formatter,
};

use itertools::Itertools;
use rustc_hash::FxHashSet;
use slotmap::{
    new_key_type,
    SlotMap,
};
use tracing::trace;

use crate::{
    error::GraphError,
    node::{
        Const,
        NodeKind,
        Opcode,
        Operands,
    },
    ty::Type,
    FxIndexSet,
    Node,
    NodeRef,
};

new_key_type! { pub struct FunctionRef; }

/// A function-level unit of IR: a dataflow graph of [`Node`]s.
///
/// Operand edges and user sets mirror each other. Both are only ever changed
/// by the mutation primitives on this type, so for every live node `n` and
/// every operand `m` of `n`, `users(m)` contains `n` exactly once.
///
/// Nodes live in a generational arena. A [`NodeRef`] of a removed node stays
/// invalid forever; accessing it yields [`GraphError::AlreadyRemoved`].
#[derive(Debug, Clone, Default)]
pub struct Function {
    pub name: String,
    nodes: SlotMap<NodeRef, Node>,
    /// Nodes in insertion order. Removed nodes stay behind until the next
    /// compaction and are skipped when iterating.
    order: Vec<NodeRef>,
    params: Vec<NodeRef>,
    return_value: Option<NodeRef>,
    next_id: usize,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Returns the live nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeRef> + '_ {
        self.order
            .iter()
            .copied()
            .filter(|node| self.nodes.contains_key(*node))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, node: NodeRef) -> bool {
        self.nodes.contains_key(node)
    }

    pub fn node(&self, node: NodeRef) -> Result<&Node, GraphError> {
        self.nodes.get(node).ok_or(GraphError::AlreadyRemoved(node))
    }

    fn node_mut(&mut self, node: NodeRef) -> Result<&mut Node, GraphError> {
        self.nodes
            .get_mut(node)
            .ok_or(GraphError::AlreadyRemoved(node))
    }

    /// Returns the first live node named `symbol`, in insertion order.
    ///
    /// Symbols are not required to be unique.
    pub fn node_by_name(&self, symbol: &str) -> Option<NodeRef> {
        self.nodes()
            .find(|node| self.nodes[*node].symbol == symbol)
    }

    pub fn operands(&self, node: NodeRef) -> Result<&[NodeRef], GraphError> {
        Ok(self.node(node)?.operands())
    }

    pub fn users(&self, node: NodeRef) -> Result<&FxIndexSet<NodeRef>, GraphError> {
        Ok(self.node(node)?.users())
    }

    pub fn params(&self) -> &[NodeRef] {
        &self.params
    }

    /// Returns `false` for nodes that are not live.
    pub fn is_parameter(&self, node: NodeRef) -> bool {
        self.nodes.get(node).is_some_and(Node::is_param)
    }

    pub fn return_value(&self) -> Option<NodeRef> {
        self.return_value
    }

    pub fn set_return_value(&mut self, node: Option<NodeRef>) -> Result<(), GraphError> {
        if let Some(node) = node {
            self.node(node)?;
        }
        self.return_value = node;
        Ok(())
    }

    pub fn add_param(&mut self, symbol: impl Into<String>, ty: Type) -> NodeRef {
        let symbol = symbol.into();
        let param = self.insert(NodeKind::Param, ty, Operands::new(), symbol);
        self.params.push(param);
        param
    }

    pub fn add_literal(&mut self, value: impl Into<Const>) -> NodeRef {
        let value = value.into();
        let kind = NodeKind::Literal(value);
        let symbol = self.next_symbol(&kind);
        self.insert(kind, value.ty(), Operands::new(), symbol)
    }

    /// Appends an operation and registers it as a user of each of its operands.
    pub fn add_op(
        &mut self,
        opcode: Opcode,
        ty: Type,
        operands: impl IntoIterator<Item = NodeRef>,
    ) -> Result<NodeRef, GraphError> {
        let kind = NodeKind::Op(opcode);
        let symbol = self.next_symbol(&kind);
        self.add_named_op(opcode, ty, operands, symbol)
    }

    pub fn add_named_op(
        &mut self,
        opcode: Opcode,
        ty: Type,
        operands: impl IntoIterator<Item = NodeRef>,
        symbol: impl Into<String>,
    ) -> Result<NodeRef, GraphError> {
        let operands: Operands = operands.into_iter().collect();
        if let Some(expected) = opcode.arity() {
            if expected != operands.len() {
                return Err(GraphError::ArityMismatch {
                    opcode,
                    expected,
                    actual: operands.len(),
                });
            }
        }
        for operand in operands.iter().copied() {
            self.node(operand)?;
        }
        Ok(self.insert(NodeKind::Op(opcode), ty, operands, symbol.into()))
    }

    fn next_symbol(&self, kind: &NodeKind) -> String {
        format!("{}.{}", kind.mnemonic(), self.next_id)
    }

    fn insert(&mut self, kind: NodeKind, ty: Type, operands: Operands, symbol: String) -> NodeRef {
        let edges = operands.clone();
        let node = self
            .nodes
            .insert_with_key(|id| Node::new(id, kind, ty, operands, symbol));
        for operand in edges {
            // Operands were checked to be live by the caller.
            if let Some(operand) = self.nodes.get_mut(operand) {
                operand.users.insert(node);
            }
        }
        self.order.push(node);
        self.next_id += 1;
        node
    }

    /// Removes `node` from the function.
    ///
    /// Fails if `node` is not live, still has users, or is the return value.
    /// On success `node` is dropped from the user set of each of its operands
    /// within the same call.
    pub fn remove_node(&mut self, node: NodeRef) -> Result<Node, GraphError> {
        let users = self.users(node)?.len();
        if users > 0 {
            return Err(GraphError::StillReferenced { node, users });
        }
        if self.return_value == Some(node) {
            return Err(GraphError::IsReturnValue(node));
        }
        let removed = self
            .nodes
            .remove(node)
            .ok_or(GraphError::AlreadyRemoved(node))?;
        for operand in removed.operands.iter().copied() {
            if let Some(operand) = self.nodes.get_mut(operand) {
                operand.users.swap_remove(&node);
            }
        }
        // Compact once stale entries outnumber the live nodes.
        if self.order.len() > 2 * self.nodes.len() {
            let nodes = &self.nodes;
            self.order.retain(|node| nodes.contains_key(*node));
        }
        if removed.is_param() {
            self.params.retain(|param| *param != node);
        }
        trace!("Removed {}", removed.symbol);
        Ok(removed)
    }

    /// Rewrites every operand slot referencing `old` to reference `new`.
    ///
    /// The return value designation moves along. Returns the number of
    /// consumers that were rewritten; `old` has no users afterwards.
    pub fn replace_uses_with(&mut self, old: NodeRef, new: NodeRef) -> Result<usize, GraphError> {
        self.node(new)?;
        let users = self.users(old)?.iter().copied().collect_vec();
        if old == new {
            return Ok(0);
        }
        if let Some(user) = users.iter().copied().find(|user| self.depends_on(new, *user)) {
            return Err(GraphError::WouldCycle { node: new, user });
        }
        for user in users.iter().copied() {
            let user_node = self.node_mut(user)?;
            for operand in user_node.operands.iter_mut() {
                if *operand == old {
                    *operand = new;
                }
            }
            self.node_mut(new)?.users.insert(user);
        }
        self.node_mut(old)?.users.clear();
        if self.return_value == Some(old) {
            self.return_value = Some(new);
        }
        Ok(users.len())
    }

    /// Whether `target` is `node` itself or one of its transitive operands.
    fn depends_on(&self, node: NodeRef, target: NodeRef) -> bool {
        let mut visited = FxHashSet::default();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(current) = self.nodes.get(current) {
                stack.extend(current.operands.iter().copied());
            }
        }
        false
    }
}

impl Display for Function {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let indent = "    ";
        write!(f, "fn {}(", self.name)?;
        for (index, param) in self.params.iter().copied().enumerate() {
            let param = &self.nodes[param];
            write!(f, "{}: {}", param, param.ty)?;
            if index < self.params.len() - 1 {
                write!(f, ", ")?;
            }
        }
        write!(f, ") -> ")?;
        match self.return_value {
            Some(ret) => write!(f, "{}", self.nodes[ret].ty)?,
            None => write!(f, "{}", Type::unit())?,
        }
        writeln!(f, " {{")?;
        for node in self.nodes() {
            let node = &self.nodes[node];
            if node.is_param() {
                continue;
            }
            writeln!(f, "{}{}", indent, node.display(self))?;
        }
        if let Some(ret) = self.return_value {
            writeln!(f, "{}ret {}", indent, self.nodes[ret])?;
        }
        writeln!(f, "}}")?;
        Ok(())
    }
}
