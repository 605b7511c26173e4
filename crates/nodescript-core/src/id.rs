//! Identifier newtypes for graph entities.
//!
//! Node identifiers are only unique within one scope. Every sub-graph gets its
//! own namespace, so compiled output addresses nodes by [`NodeUid`], the
//! concatenation of the owning [`ScopeId`] and the [`NodeId`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a node, unique within its scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

/// Identifier of a compiler scope. The root scope has an empty id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeId(pub String);

/// Globally unique node identifier inside one compiled program.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeUid(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        NodeId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ScopeId {
    /// The scope of the top-level graph.
    pub fn root() -> Self {
        ScopeId(String::new())
    }

    pub fn new(id: impl Into<String>) -> Self {
        ScopeId(id.into())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Scope of the inline sub-graph hosted by `host`.
    pub fn nested(host: &NodeUid) -> Self {
        ScopeId(host.0.clone())
    }
}

impl NodeUid {
    /// Combines a scope and a node id. Root-scope nodes keep their plain id.
    pub fn new(scope: &ScopeId, node: &NodeId) -> Self {
        if scope.is_root() {
            NodeUid(node.0.clone())
        } else {
            NodeUid(format!("{}:{}", scope.0, node.0))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        NodeId(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        NodeId(value)
    }
}

impl From<&str> for NodeUid {
    fn from(value: &str) -> Self {
        NodeUid(value.to_string())
    }
}

// Display implementations -- just print the inner value.

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "<root>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl fmt::Display for NodeUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
