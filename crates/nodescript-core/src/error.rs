//! Core error types for nodescript-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering
//! failures of module loading and graph editing.

use crate::id::NodeId;
use thiserror::Error;

/// Core errors produced by the nodescript-core crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// The loader could not produce a module definition for a reference.
    #[error("failed to load module '{reference}': {reason}")]
    ModuleLoadFailed { reference: String, reason: String },

    /// A node id was not found in the edited scope.
    #[error("node not found: {id}")]
    NodeNotFound { id: NodeId },

    /// A property key was not found on a node.
    #[error("property '{key}' not found on node {node}")]
    PropNotFound { node: NodeId, key: String },

    /// A node id is already taken in the edited scope.
    #[error("duplicate node id: {id}")]
    DuplicateNode { id: NodeId },
}
