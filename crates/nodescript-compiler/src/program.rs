//! Executable form of a compiled graph.
//!
//! A [`Program`] is what the listing renders and what the runtime executes.
//! Every entity is addressed by the symbol the [`SymbolTable`] allocated for
//! it, so the listing and the executable form never disagree on names.
//!
//! [`SymbolTable`]: crate::symbols::SymbolTable

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use nodescript_core::id::{NodeId, NodeUid, ScopeId};
use nodescript_core::module::ResultSpec;
use nodescript_core::schema::SchemaSpec;

/// Symbol of the root scope entry.
pub const ENTRY_SYMBOL: &str = "compute";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    /// Imported module handles by symbol.
    pub imports: IndexMap<String, Import>,
    /// Compiled scopes; nested scopes precede the scopes calling them and
    /// the root scope comes last.
    pub scopes: IndexMap<ScopeId, ScopeProgram>,
    /// Node functions by symbol.
    pub units: IndexMap<String, NodeUnit>,
    pub entry_scope: ScopeId,
    pub result: ResultSpec,
    pub introspect: bool,
    /// Node uid to node function symbol, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_map: Option<IndexMap<NodeUid, String>>,
}

impl Program {
    pub fn scope(&self, id: &ScopeId) -> Option<&ScopeProgram> {
        self.scopes.get(id)
    }

    pub fn unit(&self, symbol: &str) -> Option<&NodeUnit> {
        self.units.get(symbol)
    }

    pub fn entry(&self) -> Option<&ScopeProgram> {
        self.scopes.get(&self.entry_scope)
    }

    pub fn is_async(&self) -> bool {
        self.result.is_async
    }

    /// Looks up a node function by uid through the node map.
    pub fn node_symbol(&self, uid: &NodeUid) -> Option<&str> {
        self.node_map.as_ref()?.get(uid).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    pub reference: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeProgram {
    pub id: ScopeId,
    /// Entry function symbol.
    pub symbol: String,
    pub is_async: bool,
    /// Node function of the scope root; `None` when the scope has no root,
    /// in which case the entry returns `null`.
    pub root: Option<String>,
    /// Node functions in evaluation order.
    pub units: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUnit {
    pub symbol: String,
    pub uid: NodeUid,
    pub node_id: NodeId,
    pub scope: ScopeId,
    pub reference: String,
    pub label: String,
    /// Declared suspension-capable (the owning scope is asynchronous).
    pub is_async: bool,
    pub cached: bool,
    pub body: UnitBody,
    /// Arguments in parameter declaration order.
    pub args: Vec<(String, ArgExpr)>,
    /// Expanded lines, in line order. Non-empty turns the body into a loop.
    pub expanded: Vec<ExpandedLine>,
}

impl NodeUnit {
    pub fn is_expanding(&self) -> bool {
        !self.expanded.is_empty()
    }
}

/// Compilation strategy of a node body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum UnitBody {
    /// `params[key]` of the scope entry.
    Param,
    /// `ctx.get_local(key)`.
    Local,
    Input,
    Output,
    /// Calls an imported implementation.
    Module { import: String, is_async: bool },
    /// Calls a nested scope entry under a fresh evaluation context.
    Subgraph { scope: ScopeId, is_async: bool },
    /// Raises an unresolved node error when executed.
    Unresolved,
}

/// A call to an upstream node function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkExpr {
    pub call: String,
    pub is_async: bool,
    /// Dotted projection applied to the upstream result.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub link_key: String,
    /// Conversion target when the upstream schema is not compatible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convert: Option<SchemaSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "expr", rename_all = "camelCase")]
pub enum ArgExpr {
    Literal(Value),
    Link(LinkExpr),
    /// Thunk resolved by the consuming node.
    Deferred(LinkExpr),
    /// Callable evaluated under a nested scope; wraps a link or a literal.
    Lambda(Box<ArgExpr>),
    /// Per-iteration element of an expanded line.
    Expanded {
        symbol: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        convert: Option<SchemaSpec>,
    },
    Object(Vec<(String, ArgExpr)>),
    Array(Vec<ArgExpr>),
}

impl ArgExpr {
    /// Whether the expression reads a per-iteration expanded element and
    /// must be evaluated inside the expansion loop.
    pub fn contains_expanded(&self) -> bool {
        match self {
            ArgExpr::Expanded { .. } => true,
            ArgExpr::Object(fields) => fields.iter().any(|(_, e)| e.contains_expanded()),
            ArgExpr::Array(items) => items.iter().any(ArgExpr::contains_expanded),
            _ => false,
        }
    }

    /// Symbols of the expanded lines read by the expression, in line order.
    pub fn expanded_symbols(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_expanded(&mut out);
        out
    }

    fn collect_expanded<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            ArgExpr::Expanded { symbol, .. } => out.push(symbol),
            ArgExpr::Object(fields) => fields.iter().for_each(|(_, e)| e.collect_expanded(out)),
            ArgExpr::Array(items) => items.iter().for_each(|e| e.collect_expanded(out)),
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpandedLine {
    pub symbol: String,
    /// Upstream call; conversion happens per element.
    pub source: LinkExpr,
    /// The upstream node already produces an array per expansion; its
    /// result is used as is.
    pub upstream_expanded: bool,
}
