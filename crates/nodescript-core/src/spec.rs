//! In-memory graph specification.
//!
//! [`GraphSpec`] is the snapshot produced by the editing layer: nodes keyed by
//! id, each referencing a module and carrying property lines. A property line
//! either holds a literal or links to another node's result, optionally
//! projected through a dotted `linkKey` and optionally expanded (broadcast).
//!
//! Object and array parameters may carry entries, child property lines that
//! are individually literal or linked. When a property has entries, its own
//! line is ignored.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::id::NodeId;
use crate::module::ModuleSpec;

/// Prefix of references that point at a shared sub-graph definition stored in
/// [`GraphSpec::subgraphs`].
pub const SUBGRAPH_REF_PREFIX: &str = "@subgraph/";

/// A complete graph: the compiled program's contract plus its nodes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSpec {
    #[serde(default)]
    pub module_spec: ModuleSpec,
    #[serde(default)]
    pub root_node_id: NodeId,
    #[serde(default)]
    pub nodes: IndexMap<NodeId, NodeSpec>,
    #[serde(default)]
    pub subgraphs: IndexMap<String, SubgraphSpec>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// A nested graph, either inline on a host node or shared through
/// [`GraphSpec::subgraphs`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubgraphSpec {
    /// Contract of a shared definition. Inline sub-graphs use the host
    /// module's contract instead.
    #[serde(default)]
    pub module_spec: ModuleSpec,
    #[serde(default)]
    pub root_node_id: NodeId,
    #[serde(default)]
    pub nodes: IndexMap<NodeId, NodeSpec>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// One node instance.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,
    #[serde(default)]
    pub props: IndexMap<String, PropSpec>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subgraph: Option<SubgraphSpec>,
}

/// A property line of a node.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropSpec {
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub link_key: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub expand: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entries: Option<Vec<PropEntrySpec>>,
}

/// A named or positional child line of an object/array property.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropEntrySpec {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub link_key: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub expand: bool,
}

/// Borrowed view of a single property line, whether it is a property's own
/// line or one of its entries.
#[derive(Debug, Clone, Copy)]
pub struct LineRef<'a> {
    pub prop_key: &'a str,
    /// Entry id when the line is an entry.
    pub entry_id: Option<&'a str>,
    pub link_id: Option<&'a NodeId>,
    pub link_key: &'a str,
    pub expand: bool,
}

impl GraphSpec {
    pub fn new(root_node_id: impl Into<NodeId>) -> Self {
        GraphSpec {
            root_node_id: root_node_id.into(),
            ..Default::default()
        }
    }

    pub fn with_module_spec(mut self, module_spec: ModuleSpec) -> Self {
        self.module_spec = module_spec;
        self
    }

    pub fn with_node(mut self, id: impl Into<NodeId>, node: NodeSpec) -> Self {
        self.nodes.insert(id.into(), node);
        self
    }

    pub fn with_subgraph(mut self, id: impl Into<String>, subgraph: SubgraphSpec) -> Self {
        self.subgraphs.insert(id.into(), subgraph);
        self
    }
}

impl SubgraphSpec {
    pub fn new(root_node_id: impl Into<NodeId>) -> Self {
        SubgraphSpec {
            root_node_id: root_node_id.into(),
            ..Default::default()
        }
    }

    pub fn with_module_spec(mut self, module_spec: ModuleSpec) -> Self {
        self.module_spec = module_spec;
        self
    }

    pub fn with_node(mut self, id: impl Into<NodeId>, node: NodeSpec) -> Self {
        self.nodes.insert(id.into(), node);
        self
    }
}

impl NodeSpec {
    pub fn new(reference: impl Into<String>) -> Self {
        NodeSpec {
            reference: reference.into(),
            ..Default::default()
        }
    }

    pub fn with_prop(mut self, key: impl Into<String>, prop: PropSpec) -> Self {
        self.props.insert(key.into(), prop);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_subgraph(mut self, subgraph: SubgraphSpec) -> Self {
        self.subgraph = Some(subgraph);
        self
    }

    /// Shared sub-graph id referenced by this node, if any.
    pub fn subgraph_ref(&self) -> Option<&str> {
        self.reference.strip_prefix(SUBGRAPH_REF_PREFIX)
    }

    /// All effective property lines in declaration order, entries expanded
    /// in place of their owning property.
    pub fn lines(&self) -> Vec<LineRef<'_>> {
        let mut lines = Vec::new();
        for (key, prop) in &self.props {
            match &prop.entries {
                Some(entries) => {
                    for entry in entries {
                        lines.push(LineRef {
                            prop_key: key,
                            entry_id: Some(&entry.id),
                            link_id: entry.link_id.as_ref(),
                            link_key: &entry.link_key,
                            expand: entry.expand,
                        });
                    }
                }
                None => lines.push(LineRef {
                    prop_key: key,
                    entry_id: None,
                    link_id: prop.link_id.as_ref(),
                    link_key: &prop.link_key,
                    expand: prop.expand,
                }),
            }
        }
        lines
    }

    /// Clears the link of the line identified by `prop_key`/`entry_id`.
    /// Returns `true` if a link was removed.
    pub fn clear_line_link(&mut self, prop_key: &str, entry_id: Option<&str>) -> bool {
        let Some(prop) = self.props.get_mut(prop_key) else {
            return false;
        };
        match entry_id {
            None => prop.link_id.take().is_some(),
            Some(entry_id) => prop
                .entries
                .iter_mut()
                .flatten()
                .find(|e| e.id == entry_id)
                .and_then(|e| e.link_id.take())
                .is_some(),
        }
    }
}

impl PropSpec {
    pub fn literal(value: impl Into<String>) -> Self {
        PropSpec {
            value: value.into(),
            ..Default::default()
        }
    }

    pub fn link(link_id: impl Into<NodeId>) -> Self {
        PropSpec {
            link_id: Some(link_id.into()),
            ..Default::default()
        }
    }

    pub fn with_link_key(mut self, link_key: impl Into<String>) -> Self {
        self.link_key = link_key.into();
        self
    }

    pub fn expanded(mut self) -> Self {
        self.expand = true;
        self
    }

    pub fn with_entries(entries: Vec<PropEntrySpec>) -> Self {
        PropSpec {
            entries: Some(entries),
            ..Default::default()
        }
    }
}

impl PropEntrySpec {
    pub fn literal(id: impl Into<String>, key: impl Into<String>, value: impl Into<String>) -> Self {
        PropEntrySpec {
            id: id.into(),
            key: key.into(),
            value: value.into(),
            ..Default::default()
        }
    }

    pub fn link(id: impl Into<String>, key: impl Into<String>, link_id: impl Into<NodeId>) -> Self {
        PropEntrySpec {
            id: id.into(),
            key: key.into(),
            link_id: Some(link_id.into()),
            ..Default::default()
        }
    }

    pub fn with_link_key(mut self, link_key: impl Into<String>) -> Self {
        self.link_key = link_key.into();
        self
    }

    pub fn expanded(mut self) -> Self {
        self.expand = true;
        self
    }
}
