use std::hash::BuildHasherDefault;

pub use error::GraphError;
pub use function::{
    Function,
    FunctionRef,
};
pub use module::Module;
pub use node::{
    Node,
    NodeKind,
    NodeRef,
};
pub use ty::Type;
pub use verifier::{
    Verifier,
    VerifyError,
};

pub mod error;
pub mod function;
pub mod node;

/// Insertion-ordered hash set, used wherever iteration order must be stable.
pub type FxIndexSet<T> = indexmap::IndexSet<T, BuildHasherDefault<rustc_hash::FxHasher>>;

pub mod analysis;
pub mod module;
pub mod optimization;

pub mod ty;
pub mod verifier;
