//! Graph: a [`GraphSpec`] together with the module contracts its nodes
//! reference.
//!
//! [`Graph`] is the entry point for building and editing graphs. Every
//! structural mutation re-applies the acyclicity invariant: links that would
//! make a node (transitively) depend on itself are cleared rather than
//! rejected, so the editor can keep working on a partially invalid graph.
//!
//! # Scopes
//!
//! The root graph and every nested sub-graph form separate scopes with their
//! own node namespaces:
//! - the root scope ([`ScopeId::root`]),
//! - one scope per node carrying an inline sub-graph, identified by the host
//!   node's uid,
//! - one scope per shared definition in [`GraphSpec::subgraphs`], identified
//!   by its `@subgraph/<id>` reference.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::builtins::BuiltinKind;
use crate::error::CoreError;
use crate::id::{NodeId, NodeUid, ScopeId};
use crate::loader::ModuleLoader;
use crate::module::ModuleSpec;
use crate::spec::{GraphSpec, NodeSpec, PropSpec, SUBGRAPH_REF_PREFIX};
use crate::topology::{Link, ParamLookup, Topology};

/// Options for [`Graph::load`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadOptions {
    /// Substitute an unresolved stand-in for modules that fail to load
    /// instead of failing the whole graph.
    #[serde(default)]
    pub ignore_failed_defs: bool,
}

/// A module contract as seen by one graph.
#[derive(Debug, Clone)]
pub struct ResolvedModule {
    pub spec: ModuleSpec,
    /// `false` for stand-ins of references the loader could not resolve.
    pub resolved: bool,
    /// Location of the implementation, empty for built-ins and stand-ins.
    pub compute_url: String,
}

/// A link cleared by invariant application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearedLink {
    pub scope: ScopeId,
    pub link: Link,
}

/// Borrowed view of one scope.
#[derive(Debug, Clone)]
pub struct GraphScope<'g> {
    pub id: ScopeId,
    pub nodes: &'g IndexMap<NodeId, NodeSpec>,
    pub root_node_id: &'g NodeId,
    /// Contract of the scope: the graph's module spec for the root scope, the
    /// host's module spec for inline sub-graphs, the definition's own module
    /// spec for shared sub-graphs.
    pub contract: &'g ModuleSpec,
    graph: &'g Graph,
}

impl<'g> GraphScope<'g> {
    /// Topology over the lines the compiled program will evaluate: links on
    /// keys a node's contract does not declare are ignored.
    pub fn topology(&self) -> Topology<'g> {
        Topology::new(self.nodes).with_params(self.graph)
    }

    pub fn node(&self, id: &NodeId) -> Option<&'g NodeSpec> {
        self.nodes.get(id)
    }

    pub fn uid(&self, id: &NodeId) -> NodeUid {
        NodeUid::new(&self.id, id)
    }

    /// Scope of the sub-graph hosted by `id`, inline or shared.
    pub fn subgraph_scope_of(&self, id: &NodeId) -> Option<ScopeId> {
        let node = self.nodes.get(id)?;
        if node.subgraph.is_some() {
            return Some(ScopeId::nested(&self.uid(id)));
        }
        node.subgraph_ref()
            .map(|_| ScopeId::new(node.reference.clone()))
    }
}

/// A graph specification bound to its resolved module contracts.
#[derive(Debug, Clone)]
pub struct Graph {
    spec: GraphSpec,
    modules: IndexMap<String, ResolvedModule>,
}

impl Graph {
    /// Builds a graph resolving every reference synchronously. References the
    /// loader does not know become unresolved stand-ins.
    pub fn new(spec: GraphSpec, loader: &dyn ModuleLoader) -> Self {
        let mut graph = Graph {
            spec,
            modules: IndexMap::new(),
        };
        for reference in graph.collect_refs() {
            let module = match graph.builtin_or_shared(&reference) {
                Some(module) => module,
                None => match loader.resolve_module(&reference) {
                    Some(spec) => ResolvedModule {
                        spec,
                        resolved: true,
                        compute_url: loader.resolve_compute_url(&reference),
                    },
                    None => unresolved(&reference),
                },
            };
            graph.modules.insert(reference, module);
        }
        graph.apply_invariants();
        graph
    }

    /// Builds a graph loading every distinct reference through
    /// [`ModuleLoader::load_module`].
    pub async fn load(
        spec: GraphSpec,
        loader: &dyn ModuleLoader,
        options: &LoadOptions,
    ) -> Result<Self, CoreError> {
        let mut graph = Graph {
            spec,
            modules: IndexMap::new(),
        };
        for reference in graph.collect_refs() {
            let module = match graph.builtin_or_shared(&reference) {
                Some(module) => module,
                None => match loader.load_module(&reference).await {
                    Ok(spec) => ResolvedModule {
                        spec,
                        resolved: true,
                        compute_url: loader.resolve_compute_url(&reference),
                    },
                    Err(err) if options.ignore_failed_defs => {
                        tracing::warn!("using unresolved stand-in for '{}': {}", reference, err);
                        unresolved(&reference)
                    }
                    Err(err) => return Err(err),
                },
            };
            graph.modules.insert(reference, module);
        }
        graph.apply_invariants();
        Ok(graph)
    }

    fn builtin_or_shared(&self, reference: &str) -> Option<ResolvedModule> {
        if let Some(kind) = BuiltinKind::from_ref(reference) {
            return Some(ResolvedModule {
                spec: kind.module_spec(),
                resolved: true,
                compute_url: String::new(),
            });
        }
        let id = reference.strip_prefix(SUBGRAPH_REF_PREFIX)?;
        Some(match self.spec.subgraphs.get(id) {
            Some(def) => ResolvedModule {
                spec: def.module_spec.clone(),
                resolved: true,
                compute_url: String::new(),
            },
            None => unresolved(reference),
        })
    }

    fn collect_refs(&self) -> IndexSet<String> {
        fn walk(nodes: &IndexMap<NodeId, NodeSpec>, refs: &mut IndexSet<String>) {
            for node in nodes.values() {
                refs.insert(node.reference.clone());
                if let Some(sub) = &node.subgraph {
                    walk(&sub.nodes, refs);
                }
            }
        }
        let mut refs = IndexSet::new();
        walk(&self.spec.nodes, &mut refs);
        for def in self.spec.subgraphs.values() {
            walk(&def.nodes, &mut refs);
        }
        refs
    }

    fn ensure_module(&mut self, reference: &str, loader: &dyn ModuleLoader) {
        if self.modules.contains_key(reference) {
            return;
        }
        let module = self.builtin_or_shared(reference).unwrap_or_else(|| {
            match loader.resolve_module(reference) {
                Some(spec) => ResolvedModule {
                    spec,
                    resolved: true,
                    compute_url: loader.resolve_compute_url(reference),
                },
                None => unresolved(reference),
            }
        });
        self.modules.insert(reference.to_string(), module);
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    pub fn spec(&self) -> &GraphSpec {
        &self.spec
    }

    pub fn module_spec(&self) -> &ModuleSpec {
        &self.spec.module_spec
    }

    pub fn root_node_id(&self) -> &NodeId {
        &self.spec.root_node_id
    }

    pub fn node(&self, id: &NodeId) -> Option<&NodeSpec> {
        self.spec.nodes.get(id)
    }

    /// The resolved contract behind a reference, if the reference occurs in
    /// this graph.
    pub fn module(&self, reference: &str) -> Option<&ResolvedModule> {
        self.modules.get(reference)
    }

    pub fn is_resolved(&self, reference: &str) -> bool {
        self.modules.get(reference).is_some_and(|m| m.resolved)
    }

    /// Contract a node is compiled against: its resolved module, else the
    /// contract of its inline sub-graph, else the unresolved stand-in.
    pub fn node_contract<'a>(&'a self, node: &'a NodeSpec) -> Option<&'a ModuleSpec> {
        let module = self.modules.get(&node.reference);
        match (module, &node.subgraph) {
            (Some(module), _) if module.resolved => Some(&module.spec),
            (_, Some(sub)) => Some(&sub.module_spec),
            (module, None) => module.map(|m| &m.spec),
        }
    }

    pub fn root_scope(&self) -> GraphScope<'_> {
        GraphScope {
            id: ScopeId::root(),
            nodes: &self.spec.nodes,
            root_node_id: &self.spec.root_node_id,
            contract: &self.spec.module_spec,
            graph: self,
        }
    }

    /// Looks up any scope of the graph by id.
    pub fn scope(&self, id: &ScopeId) -> Option<GraphScope<'_>> {
        self.scopes().into_iter().find(|s| &s.id == id)
    }

    /// Every scope of the graph: root first, then inline sub-graphs
    /// depth-first, then shared definitions.
    pub fn scopes(&self) -> Vec<GraphScope<'_>> {
        let mut out = Vec::new();
        self.push_scope(self.root_scope(), &mut out);
        for (id, def) in &self.spec.subgraphs {
            let scope = GraphScope {
                id: ScopeId::new(format!("{SUBGRAPH_REF_PREFIX}{id}")),
                nodes: &def.nodes,
                root_node_id: &def.root_node_id,
                contract: &def.module_spec,
                graph: self,
            };
            self.push_scope(scope, &mut out);
        }
        out
    }

    fn push_scope<'g>(&'g self, scope: GraphScope<'g>, out: &mut Vec<GraphScope<'g>>) {
        let nested: Vec<GraphScope<'g>> = scope
            .nodes
            .iter()
            .filter_map(|(id, node)| {
                let sub = node.subgraph.as_ref()?;
                let contract = self
                    .modules
                    .get(&node.reference)
                    .map(|m| &m.spec)
                    .unwrap_or(&sub.module_spec);
                Some(GraphScope {
                    id: ScopeId::nested(&scope.uid(id)),
                    nodes: &sub.nodes,
                    root_node_id: &sub.root_node_id,
                    contract,
                    graph: self,
                })
            })
            .collect();
        out.push(scope);
        for child in nested {
            self.push_scope(child, out);
        }
    }

    // -----------------------------------------------------------------------
    // Mutations (root scope)
    // -----------------------------------------------------------------------

    /// Adds a node to the root scope, resolving its reference if new.
    pub fn add_node(
        &mut self,
        id: impl Into<NodeId>,
        node: NodeSpec,
        loader: &dyn ModuleLoader,
    ) -> Result<Vec<ClearedLink>, CoreError> {
        let id = id.into();
        if self.spec.nodes.contains_key(&id) {
            return Err(CoreError::DuplicateNode { id });
        }
        self.ensure_module(&node.reference, loader);
        if let Some(sub) = &node.subgraph {
            let mut refs = Vec::new();
            collect_nested_refs(&sub.nodes, &mut refs);
            for reference in refs {
                self.ensure_module(&reference, loader);
            }
        }
        self.spec.nodes.insert(id, node);
        Ok(self.apply_invariants())
    }

    /// Removes a node from the root scope and clears every link pointing at
    /// it.
    pub fn remove_node(&mut self, id: &NodeId) -> Result<NodeSpec, CoreError> {
        let removed = self
            .spec
            .nodes
            .shift_remove(id)
            .ok_or_else(|| CoreError::NodeNotFound { id: id.clone() })?;
        for node in self.spec.nodes.values_mut() {
            for prop in node.props.values_mut() {
                if prop.link_id.as_ref() == Some(id) {
                    prop.link_id = None;
                }
                for entry in prop.entries.iter_mut().flatten() {
                    if entry.link_id.as_ref() == Some(id) {
                        entry.link_id = None;
                    }
                }
            }
        }
        Ok(removed)
    }

    /// Links `link_id`'s result into `prop_key` of `node_id`. Returns `false`
    /// if the link was cleared again because it would create a cycle.
    pub fn set_link(
        &mut self,
        node_id: &NodeId,
        prop_key: &str,
        link_id: &NodeId,
        link_key: &str,
    ) -> Result<bool, CoreError> {
        let node = self
            .spec
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| CoreError::NodeNotFound { id: node_id.clone() })?;
        let prop = node.props.entry(prop_key.to_string()).or_insert_with(PropSpec::default);
        prop.link_id = Some(link_id.clone());
        prop.link_key = link_key.to_string();
        self.apply_invariants();
        Ok(self
            .spec
            .nodes
            .get(node_id)
            .and_then(|n| n.props.get(prop_key))
            .is_some_and(|p| p.link_id.as_ref() == Some(link_id)))
    }

    /// Removes the link of a root-scope property, keeping its literal value.
    pub fn clear_link(&mut self, node_id: &NodeId, prop_key: &str) -> Result<(), CoreError> {
        let node = self
            .spec
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| CoreError::NodeNotFound { id: node_id.clone() })?;
        if !node.props.contains_key(prop_key) {
            return Err(CoreError::PropNotFound {
                node: node_id.clone(),
                key: prop_key.to_string(),
            });
        }
        node.clear_line_link(prop_key, None);
        Ok(())
    }

    /// Re-validates every link in every scope, clearing links whose source
    /// could not link into the consumer without creating a cycle.
    pub fn apply_invariants(&mut self) -> Vec<ClearedLink> {
        let mut cleared = Vec::new();
        apply_scope_invariants(&mut self.spec.nodes, &ScopeId::root(), &mut cleared);
        for (id, def) in self.spec.subgraphs.iter_mut() {
            let scope = ScopeId::new(format!("{SUBGRAPH_REF_PREFIX}{id}"));
            apply_scope_invariants(&mut def.nodes, &scope, &mut cleared);
        }
        cleared
    }
}

impl ParamLookup for Graph {
    fn declares(&self, node: &NodeSpec, key: &str) -> bool {
        self.node_contract(node)
            .is_some_and(|contract| contract.params.contains_key(key))
    }
}

fn unresolved(reference: &str) -> ResolvedModule {
    ResolvedModule {
        spec: ModuleSpec::unresolved(reference),
        resolved: false,
        compute_url: String::new(),
    }
}

fn collect_nested_refs(nodes: &IndexMap<NodeId, NodeSpec>, refs: &mut Vec<String>) {
    for node in nodes.values() {
        refs.push(node.reference.clone());
        if let Some(sub) = &node.subgraph {
            collect_nested_refs(&sub.nodes, refs);
        }
    }
}

fn apply_scope_invariants(
    nodes: &mut IndexMap<NodeId, NodeSpec>,
    scope: &ScopeId,
    cleared: &mut Vec<ClearedLink>,
) {
    let ids: Vec<NodeId> = nodes.keys().cloned().collect();
    for id in &ids {
        let lines: Vec<Link> = match nodes.get(id) {
            Some(node) => node
                .lines()
                .into_iter()
                .filter_map(|line| {
                    Some(Link {
                        node_id: id.clone(),
                        prop_key: line.prop_key.to_string(),
                        entry_id: line.entry_id.map(str::to_string),
                        link_id: line.link_id?.clone(),
                        link_key: line.link_key.to_string(),
                    })
                })
                .collect(),
            None => continue,
        };
        for link in lines {
            // Dangling links are compiled as literals, not cleared.
            if !nodes.contains_key(&link.link_id) {
                continue;
            }
            if Topology::new(nodes).can_link_to(&link.link_id, id) {
                continue;
            }
            if let Some(node) = nodes.get_mut(id) {
                node.clear_line_link(&link.prop_key, link.entry_id.as_deref());
            }
            tracing::trace!(
                "cleared cyclic link {} -> {}.{} in scope {}",
                link.link_id,
                id,
                link.prop_key,
                scope
            );
            cleared.push(ClearedLink {
                scope: scope.clone(),
                link,
            });
        }
    }
    for id in &ids {
        let uid = NodeUid::new(scope, id);
        if let Some(sub) = nodes.get_mut(id).and_then(|n| n.subgraph.as_mut()) {
            apply_scope_invariants(&mut sub.nodes, &ScopeId::nested(&uid), cleared);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::InMemoryLoader;
    use crate::module::{ParamSpec, ResultSpec};
    use crate::schema::SchemaSpec;
    use crate::spec::SubgraphSpec;
    use futures::future::{self, BoxFuture, FutureExt};

    fn loader() -> InMemoryLoader {
        InMemoryLoader::new().with_module(
            "Math.Add",
            ModuleSpec::new("Add")
                .with_param("a", ParamSpec::new(SchemaSpec::number()))
                .with_param("b", ParamSpec::new(SchemaSpec::number()))
                .with_result(ResultSpec::sync(SchemaSpec::number())),
        )
    }

    fn add(a: PropSpec, b: PropSpec) -> NodeSpec {
        NodeSpec::new("Math.Add").with_prop("a", a).with_prop("b", b)
    }

    #[test]
    fn new_resolves_known_and_stands_in_for_unknown() {
        let spec = GraphSpec::new("root")
            .with_node("root", add(PropSpec::link("x"), PropSpec::literal("1")))
            .with_node("x", NodeSpec::new("@system/Param").with_prop("key", PropSpec::literal("x")))
            .with_node("ghost", NodeSpec::new("Missing.Module"));
        let graph = Graph::new(spec, &loader());

        assert!(graph.is_resolved("Math.Add"));
        assert!(graph.is_resolved("@system/Param"));
        assert!(!graph.is_resolved("Missing.Module"));
        assert_eq!(graph.module("Math.Add").unwrap().compute_url, "Math.Add");
        assert_eq!(
            graph.module("Missing.Module").unwrap().spec.description,
            "Unresolved module"
        );
    }

    #[test]
    fn construction_clears_cyclic_links() {
        // a <-> b
        let spec = GraphSpec::new("a")
            .with_node("a", add(PropSpec::link("b"), PropSpec::literal("1")))
            .with_node("b", add(PropSpec::link("a"), PropSpec::literal("1")));
        let graph = Graph::new(spec, &loader());

        let a = graph.node(&NodeId::new("a")).unwrap();
        let b = graph.node(&NodeId::new("b")).unwrap();
        assert!(a.props["a"].link_id.is_none());
        assert_eq!(b.props["a"].link_id, Some(NodeId::new("a")));
    }

    #[test]
    fn self_link_is_cleared() {
        let spec = GraphSpec::new("a").with_node("a", add(PropSpec::link("a"), PropSpec::literal("1")));
        let mut graph = Graph::new(spec, &loader());
        assert!(graph.node(&NodeId::new("a")).unwrap().props["a"].link_id.is_none());
        assert!(graph.apply_invariants().is_empty());
    }

    #[test]
    fn set_link_reports_cleared_cycle() {
        let spec = GraphSpec::new("c")
            .with_node("a", add(PropSpec::literal("1"), PropSpec::literal("2")))
            .with_node("b", add(PropSpec::link("a"), PropSpec::literal("2")))
            .with_node("c", add(PropSpec::link("b"), PropSpec::literal("2")));
        let mut graph = Graph::new(spec, &loader());
        let (a, c) = (NodeId::new("a"), NodeId::new("c"));

        assert!(!graph.set_link(&a, "b", &c, "").unwrap());
        assert!(graph.node(&a).unwrap().props["b"].link_id.is_none());

        let d = NodeId::new("d");
        graph
            .add_node("d", add(PropSpec::literal("0"), PropSpec::literal("0")), &loader())
            .unwrap();
        assert!(graph.set_link(&d, "a", &c, "").unwrap());
    }

    #[test]
    fn remove_node_clears_links_to_it() {
        let spec = GraphSpec::new("b")
            .with_node("a", add(PropSpec::literal("1"), PropSpec::literal("2")))
            .with_node("b", add(PropSpec::link("a"), PropSpec::literal("2")));
        let mut graph = Graph::new(spec, &loader());
        graph.remove_node(&NodeId::new("a")).unwrap();
        assert!(graph.node(&NodeId::new("b")).unwrap().props["a"].link_id.is_none());
        assert!(matches!(
            graph.remove_node(&NodeId::new("a")),
            Err(CoreError::NodeNotFound { .. })
        ));
    }

    #[test]
    fn add_node_rejects_duplicates() {
        let spec = GraphSpec::new("a").with_node("a", add(PropSpec::literal("1"), PropSpec::literal("2")));
        let mut graph = Graph::new(spec, &loader());
        let err = graph
            .add_node("a", NodeSpec::new("Math.Add"), &loader())
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateNode { .. }));
    }

    #[test]
    fn scopes_enumerate_inline_and_shared_subgraphs() {
        let inner = SubgraphSpec::new("out")
            .with_node("out", NodeSpec::new("@system/Output").with_prop("value", PropSpec::link("in")))
            .with_node("in", NodeSpec::new("@system/Local").with_prop("key", PropSpec::literal("v")));
        let spec = GraphSpec::new("host")
            .with_node("host", NodeSpec::new("Flow.Scope").with_subgraph(inner.clone()))
            .with_node("shared", NodeSpec::new("@subgraph/twice"))
            .with_subgraph("twice", inner);
        let graph = Graph::new(spec, &loader());

        let ids: Vec<String> = graph.scopes().iter().map(|s| s.id.0.clone()).collect();
        assert_eq!(ids, vec!["", "host", "@subgraph/twice"]);

        let root = graph.root_scope();
        assert_eq!(
            root.subgraph_scope_of(&NodeId::new("host")),
            Some(ScopeId::new("host"))
        );
        assert_eq!(
            root.subgraph_scope_of(&NodeId::new("shared")),
            Some(ScopeId::new("@subgraph/twice"))
        );
        assert!(graph.is_resolved("@subgraph/twice"));
        assert!(graph.is_resolved("@system/Local"));
        let nested = graph.scope(&ScopeId::new("host")).unwrap();
        assert_eq!(nested.uid(&NodeId::new("out")).as_str(), "host:out");
    }

    #[test]
    fn scope_topology_ignores_undeclared_keys() {
        let spec = GraphSpec::new("root")
            .with_node(
                "root",
                add(PropSpec::link("x"), PropSpec::literal("1")).with_prop("stale", PropSpec::link("y")),
            )
            .with_node("x", NodeSpec::new("@system/Param").with_prop("key", PropSpec::literal("x")))
            .with_node("y", NodeSpec::new("@system/Param").with_prop("key", PropSpec::literal("y")))
            .with_node("ghost", NodeSpec::new("Missing.Module").with_prop("in", PropSpec::link("x")));
        let graph = Graph::new(spec, &loader());
        let root = NodeId::new("root");

        let topo = graph.root_scope().topology();
        assert_eq!(topo.compute_order(&root), vec![NodeId::new("x"), root.clone()]);
        let map = topo.compute_link_map();
        assert_eq!(map[&NodeId::new("x")].len(), 1);
        assert!(map[&NodeId::new("y")].is_empty());

        // The raw view still sees every line, so edits keep clearing cycles.
        let raw = Topology::new(&graph.spec().nodes);
        assert_eq!(raw.compute_link_map()[&NodeId::new("x")].len(), 2);

        let ghost = graph.node(&NodeId::new("ghost")).unwrap();
        assert!(!graph.declares(ghost, "in"));
        assert!(graph.declares(graph.node(&root).unwrap(), "a"));
    }

    struct FailingLoader;

    impl ModuleLoader for FailingLoader {
        fn resolve_module(&self, _reference: &str) -> Option<ModuleSpec> {
            None
        }

        fn load_module<'a>(&'a self, reference: &'a str) -> BoxFuture<'a, Result<ModuleSpec, CoreError>> {
            future::ready(Err(CoreError::ModuleLoadFailed {
                reference: reference.to_string(),
                reason: "network unreachable".to_string(),
            }))
            .boxed()
        }

        fn resolve_compute_url(&self, reference: &str) -> String {
            reference.to_string()
        }
    }

    #[tokio::test]
    async fn load_propagates_failures_unless_ignored() {
        let spec = GraphSpec::new("x")
            .with_node("x", NodeSpec::new("Remote.Thing"))
            .with_node("p", NodeSpec::new("@system/Param"));

        let err = Graph::load(spec.clone(), &FailingLoader, &LoadOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ModuleLoadFailed { .. }));

        let options = LoadOptions {
            ignore_failed_defs: true,
        };
        let graph = Graph::load(spec, &FailingLoader, &options).await.unwrap();
        assert!(!graph.is_resolved("Remote.Thing"));
        assert!(graph.is_resolved("@system/Param"));
    }
}
