use crate::{
    node::Opcode,
    NodeRef,
};

/// Failures of the graph mutation primitives.
///
/// None of these are recoverable input errors: a pass that observes one has
/// either broken an invariant itself or raced with another writer.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("Node {node:?} is still referenced by {users} live user(s)")]
    StillReferenced { node: NodeRef, users: usize },
    #[error("Node {0:?} is not live")]
    AlreadyRemoved(NodeRef),
    #[error("Node {0:?} is the return value and cannot be removed")]
    IsReturnValue(NodeRef),
    #[error("Replacing uses with {node:?} would make {user:?} depend on itself")]
    WouldCycle { node: NodeRef, user: NodeRef },
    #[error("Opcode `{opcode}` expects {expected} operand(s), got {actual}")]
    ArityMismatch {
        opcode: Opcode,
        expected: usize,
        actual: usize,
    },
}
