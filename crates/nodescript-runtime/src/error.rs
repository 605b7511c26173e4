//! Runtime error types.
//!
//! Errors are `Clone` because cache-enabled nodes memoize their failure and
//! rethrow it on every later access within the same scope.

use nodescript_check::CodecError;
use nodescript_core::id::NodeUid;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum RuntimeError {
    /// A node whose reference could not be resolved was executed.
    #[error("unresolved node {node}: {reference}")]
    UnresolvedNode { node: NodeUid, reference: String },

    /// Control signal of step-through evaluation: the node is staged and must
    /// not be computed. Never memoized and never reported as a node error.
    #[error("node {node} is pending")]
    NodePending { node: NodeUid },

    /// Failure raised by a node implementation.
    #[error("{message}")]
    Node { message: String },

    #[error("conversion failed: {0}")]
    Conversion(#[from] CodecError),

    /// No implementation is registered for an imported module.
    #[error("no implementation for {reference} (imported from {url})")]
    ImportNotFound { reference: String, url: String },

    #[error("program is asynchronous, use compute_async")]
    AsyncProgram,

    /// A synchronous program hit a suspension point.
    #[error("synchronous program suspended")]
    UnexpectedSuspension,

    #[error("node {uid} is not in the node map")]
    NodeNotInMap { uid: NodeUid },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl RuntimeError {
    /// Convenience constructor for node implementations.
    pub fn node(message: impl Into<String>) -> Self {
        RuntimeError::Node {
            message: message.into(),
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        RuntimeError::Internal {
            message: message.into(),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, RuntimeError::NodePending { .. })
    }
}
