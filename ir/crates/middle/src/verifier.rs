use std::fmt::{
    Display,
    Formatter,
};

use crate::{
    Function,
    NodeRef,
};

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum VerifyError {
    ReturnValueNotLive(NodeRef),
    DanglingOperand { user: NodeRef, operand: NodeRef },
    MissingUser { operand: NodeRef, user: NodeRef },
    StaleUser { node: NodeRef, user: NodeRef },
    NotAParam(NodeRef),
    UnlistedParam(NodeRef),
}

impl Display for VerifyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReturnValueNotLive(node) => write!(f, "Return value {node:?} is not live"),
            Self::DanglingOperand { user, operand } => {
                write!(f, "{user:?} references removed operand {operand:?}")
            }
            Self::MissingUser { operand, user } => {
                write!(f, "{user:?} uses {operand:?}, but is missing from its users")
            }
            Self::StaleUser { node, user } => {
                write!(f, "{user:?} is listed as user of {node:?}, but does not use it")
            }
            Self::NotAParam(node) => write!(f, "{node:?} is in the parameter list but is no parameter"),
            Self::UnlistedParam(node) => write!(f, "Parameter {node:?} is missing from the parameter list"),
        }
    }
}

/// Checks that operand edges and user sets of a [`Function`] mirror each other.
#[derive(Debug, Clone)]
pub struct Verifier<'func> {
    function: &'func Function,
}

impl<'func> Verifier<'func> {
    pub fn new(function: &'func Function) -> Self {
        Self { function }
    }

    pub fn verify(self) -> Vec<VerifyError> {
        let mut errors = vec![];
        let function = self.function;
        if let Some(ret) = function.return_value() {
            if !function.contains(ret) {
                errors.push(VerifyError::ReturnValueNotLive(ret));
            }
        }
        for param in function.params().iter().copied() {
            if !function.is_parameter(param) {
                errors.push(VerifyError::NotAParam(param));
            }
        }
        for node_ref in function.nodes() {
            let Ok(node) = function.node(node_ref) else {
                continue;
            };
            if node.is_param() && !function.params().contains(&node_ref) {
                errors.push(VerifyError::UnlistedParam(node_ref));
            }
            for operand in node.operands().iter().copied() {
                match function.users(operand) {
                    Err(_) => errors.push(VerifyError::DanglingOperand {
                        user: node_ref,
                        operand,
                    }),
                    Ok(users) if !users.contains(&node_ref) => {
                        errors.push(VerifyError::MissingUser {
                            operand,
                            user: node_ref,
                        })
                    }
                    Ok(_) => {}
                }
            }
            for user in node.users().iter().copied() {
                let uses_node = function
                    .operands(user)
                    .is_ok_and(|operands| operands.contains(&node_ref));
                if !uses_node {
                    errors.push(VerifyError::StaleUser {
                        node: node_ref,
                        user,
                    });
                }
            }
        }
        errors
    }
}
