use std::fmt::{
    Display,
    Formatter,
};

use derive_more::From;
use slotmap::new_key_type;
use smallvec::SmallVec;
use strum_macros::{
    Display,
    EnumIter,
};

use crate::{
    FxIndexSet,
    Function,
    Type,
};

new_key_type! { pub struct NodeRef; }

/// Operand list of a [`Node`]. The same producer may occupy several slots.
pub type Operands = SmallVec<[NodeRef; 2]>;

/// A single operation in a [`Function`]'s dataflow graph.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Node {
    pub id: NodeRef,
    pub kind: NodeKind,
    pub ty: Type,
    /// Symbol for debugging purposes. Generated symbols are unique, names
    /// passed in by the caller are taken as they are.
    pub symbol: String,
    pub(crate) operands: Operands,
    pub(crate) users: FxIndexSet<NodeRef>,
}

impl Node {
    pub(crate) fn new(
        id: NodeRef,
        kind: NodeKind,
        ty: Type,
        operands: Operands,
        symbol: String,
    ) -> Self {
        Self {
            id,
            kind,
            ty,
            symbol,
            operands,
            users: FxIndexSet::default(),
        }
    }

    pub fn operands(&self) -> &[NodeRef] {
        &self.operands
    }

    /// The distinct nodes holding at least one operand edge to this node.
    pub fn users(&self) -> &FxIndexSet<NodeRef> {
        &self.users
    }

    pub fn is_param(&self) -> bool {
        matches!(self.kind, NodeKind::Param)
    }

    pub fn display<'a>(&'a self, function: &'a Function) -> NodeDisplay<'a> {
        NodeDisplay(function, self)
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol)
    }
}

pub struct NodeDisplay<'a>(&'a Function, &'a Node);

impl Display for NodeDisplay<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let node = self.1;
        write!(f, "{}: {} = ", node, node.ty)?;
        match &node.kind {
            NodeKind::Param => write!(f, "param({node})"),
            NodeKind::Literal(value) => write!(f, "literal(value={value})"),
            NodeKind::Op(opcode) => {
                write!(f, "{opcode}(")?;
                for (index, operand) in node.operands.iter().copied().enumerate() {
                    match self.0.node(operand) {
                        Ok(operand) => write!(f, "{operand}")?,
                        Err(_) => write!(f, "<removed>")?,
                    }
                    if index < node.operands.len() - 1 {
                        write!(f, ", ")?;
                    }
                }
                write!(f, ")")
            }
        }
    }
}

/// The closed set of node kinds the graph distinguishes.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum NodeKind {
    /// A function parameter. Never removed by dead code elimination.
    Param,
    Literal(Const),
    Op(Opcode),
}

impl NodeKind {
    /// Prefix used when generating a symbol for an unnamed node.
    pub fn mnemonic(&self) -> String {
        match self {
            Self::Param => "param".to_string(),
            Self::Literal(_) => "literal".to_string(),
            Self::Op(opcode) => opcode.to_string(),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Display, EnumIter)]
pub enum Opcode {
    #[strum(serialize = "add")]
    Add,
    #[strum(serialize = "sub")]
    Sub,
    #[strum(serialize = "umul")]
    Mul,
    #[strum(serialize = "neg")]
    Neg,
    #[strum(serialize = "not")]
    Not,
    #[strum(serialize = "and")]
    And,
    #[strum(serialize = "or")]
    Or,
    #[strum(serialize = "eq")]
    Eq,
    #[strum(serialize = "sel")]
    Select,
    #[strum(serialize = "tuple")]
    Tuple,
    #[strum(serialize = "identity")]
    Identity,
}

impl Opcode {
    /// Expected operand count, `None` for variadic opcodes.
    pub const fn arity(&self) -> Option<usize> {
        match self {
            Self::Neg | Self::Not | Self::Identity => Some(1),
            Self::Add | Self::Sub | Self::Mul | Self::And | Self::Or | Self::Eq => Some(2),
            Self::Select => Some(3),
            Self::Tuple => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, From)]
pub enum Const {
    Int(i64),
    Bool(bool),
}

impl Const {
    pub fn ty(&self) -> Type {
        match self {
            Self::Int(_) => Type::bits(64),
            Self::Bool(_) => Type::BOOL,
        }
    }
}

impl Display for Const {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Bool(value) => write!(f, "{}", *value as u8),
        }
    }
}
