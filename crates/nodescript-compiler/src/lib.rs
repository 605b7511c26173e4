//! Graph compiler for nodescript graphs.
//!
//! Turns a [`Graph`](nodescript_core::Graph) into a program equivalent to a
//! single function `(params, ctx) -> result`.
//!
//! # Modules
//!
//! - [`error`] -- Compiler-internal failures
//! - [`symbols`] -- Unique names for emitted entities
//! - [`emitter`] -- Indented code buffer
//! - [`program`] -- Executable form of a compiled graph
//! - [`compiler`] -- Lowering of graph scopes into the program
//! - [`listing`] -- Human-readable rendering of a program

pub mod compiler;
pub mod emitter;
pub mod error;
pub mod listing;
pub mod program;
pub mod symbols;

pub use compiler::{compile, compile_with_codec};
pub use error::CompilerError;
pub use program::{ArgExpr, LinkExpr, NodeUnit, Program, ScopeProgram, UnitBody};

use serde::{Deserialize, Serialize};

use nodescript_core::id::NodeId;
use nodescript_core::module::ResultSpec;

/// Options controlling a compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompileOptions {
    /// Node to compile as the program result. `None` means the graph's
    /// declared root.
    pub root_node_id: Option<NodeId>,

    /// Emit progress, result and error events around every node body.
    pub introspect: bool,

    /// Annotate the listing with node labels. No semantic effect.
    pub comments: bool,

    /// Compile every node, reachable from the root or not.
    pub emit_all: bool,

    /// Export a node uid to node function map.
    pub emit_node_map: bool,
}

/// Output of [`compile`].
#[derive(Debug, Clone)]
pub struct CompiledGraph {
    /// Program listing.
    pub code: String,
    pub program: Program,
    /// Effective result contract of the entry function.
    pub result: ResultSpec,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_compile_options() {
        let opts = CompileOptions::default();
        assert!(opts.root_node_id.is_none());
        assert!(!opts.introspect);
        assert!(!opts.comments);
        assert!(!opts.emit_all);
        assert!(!opts.emit_node_map);
    }

    #[test]
    fn compile_options_from_camel_case() {
        let opts: CompileOptions = serde_json::from_str(
            r#"{"rootNodeId": "out", "introspect": true, "emitNodeMap": true}"#,
        )
        .unwrap();
        assert_eq!(opts.root_node_id, Some(NodeId::new("out")));
        assert!(opts.introspect);
        assert!(opts.emit_node_map);
        assert!(!opts.emit_all);
    }
}
