//! Compiler error types.
//!
//! Only structurally malformed input and internal defects fail a
//! compilation. Unresolved references and cycles degrade gracefully and
//! never surface here.

use nodescript_core::id::{NodeId, ScopeId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompilerError {
    /// A symbol was looked up before being allocated. Always a compiler bug.
    #[error("symbol not found: {key}")]
    SymbolNotFound { key: String },

    /// The requested root node does not exist in the root scope.
    #[error("root node not found: {id}")]
    RootNodeNotFound { id: NodeId },

    /// A scope referenced by a sub-graph host could not be located.
    #[error("scope not found: {id}")]
    ScopeNotFound { id: ScopeId },
}
