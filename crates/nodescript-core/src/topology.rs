//! Dependency analysis over the nodes of one scope.
//!
//! Links are derived on demand by scanning property lines; nothing is stored
//! besides the node map itself. Reachability queries build a transient
//! petgraph [`DiGraph`] whose edges point from a linked (source) node to the
//! node consuming it, so "upstream" means walking edges backwards.
//!
//! A topology built with [`Topology::with_params`] only follows lines on
//! property keys the node's contract declares. Links on other keys are never
//! evaluated, so they neither pull their source into the evaluation order nor
//! count as consumers.

use std::collections::{HashMap, HashSet};
use std::fmt;

use indexmap::IndexMap;
use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};
use smallvec::SmallVec;

use crate::id::NodeId;
use crate::spec::{LineRef, NodeSpec};

/// A consumer of a node's result: `(node, prop[, entry], linkNode, linkKey)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// The consuming node.
    pub node_id: NodeId,
    pub prop_key: String,
    pub entry_id: Option<String>,
    /// The node whose result is consumed.
    pub link_id: NodeId,
    pub link_key: String,
}

/// Source node -> every line consuming it. Every node of the scope has an
/// entry, possibly empty.
pub type LinkMap = IndexMap<NodeId, Vec<Link>>;

/// Tells which property keys of a node are declared parameters of its
/// contract.
pub trait ParamLookup: fmt::Debug {
    fn declares(&self, node: &NodeSpec, key: &str) -> bool;
}

/// Read-only topology view of a scope's node map.
#[derive(Debug, Clone, Copy)]
pub struct Topology<'a> {
    nodes: &'a IndexMap<NodeId, NodeSpec>,
    params: Option<&'a dyn ParamLookup>,
}

impl<'a> Topology<'a> {
    /// Topology over every property line, declared or not.
    pub fn new(nodes: &'a IndexMap<NodeId, NodeSpec>) -> Self {
        Topology { nodes, params: None }
    }

    /// Restricts the topology to lines on declared parameters.
    pub fn with_params(mut self, params: &'a dyn ParamLookup) -> Self {
        self.params = Some(params);
        self
    }

    fn lines(&self, node: &'a NodeSpec) -> Vec<LineRef<'a>> {
        let mut lines = node.lines();
        if let Some(params) = self.params {
            lines.retain(|line| params.declares(node, line.prop_key));
        }
        lines
    }

    /// Distinct nodes linked into `id`, in line declaration order. Links
    /// pointing outside the scope are ignored.
    pub fn dependencies(&self, id: &NodeId) -> SmallVec<[&'a NodeId; 4]> {
        let mut deps: SmallVec<[&'a NodeId; 4]> = SmallVec::new();
        let Some(node) = self.nodes.get(id) else {
            return deps;
        };
        for line in self.lines(node) {
            if let Some(link_id) = line.link_id {
                if let Some((key, _)) = self.nodes.get_key_value(link_id) {
                    if !deps.contains(&key) {
                        deps.push(key);
                    }
                }
            }
        }
        deps
    }

    /// Dependency-first evaluation order of every node needed by `root`.
    ///
    /// Each node is inserted right before its consumer. A node reached again
    /// through a later path is relocated to the earliest position it is
    /// required at, so every node appears exactly once.
    pub fn compute_order(&self, root: &NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        if self.nodes.contains_key(root) {
            let mut visiting = HashSet::new();
            self.place(root, 0, &mut order, &mut visiting);
        }
        order
    }

    fn place(
        &self,
        id: &NodeId,
        pos: usize,
        order: &mut Vec<NodeId>,
        visiting: &mut HashSet<NodeId>,
    ) {
        // Cycles are cleared by invariant application; this only guards
        // against graphs that skipped it.
        if !visiting.insert(id.clone()) {
            return;
        }
        match order.iter().position(|n| n == id) {
            Some(existing) if existing < pos => {
                visiting.remove(id);
                return;
            }
            Some(existing) => {
                order.remove(existing);
                order.insert(pos, id.clone());
            }
            None => order.insert(pos, id.clone()),
        }
        for dep in self.dependencies(id) {
            if let Some(at) = order.iter().position(|n| n == id) {
                self.place(dep, at, order, visiting);
            }
        }
        visiting.remove(id);
    }

    /// Computes, for every node, the lines consuming its result.
    pub fn compute_link_map(&self) -> LinkMap {
        let mut map: LinkMap = self.nodes.keys().map(|id| (id.clone(), Vec::new())).collect();
        for (node_id, node) in self.nodes {
            for line in self.lines(node) {
                let Some(link_id) = line.link_id else { continue };
                if let Some(consumers) = map.get_mut(link_id) {
                    consumers.push(Link {
                        node_id: node_id.clone(),
                        prop_key: line.prop_key.to_string(),
                        entry_id: line.entry_id.map(str::to_string),
                        link_id: link_id.clone(),
                        link_key: line.link_key.to_string(),
                    });
                }
            }
        }
        map
    }

    fn link_graph(&self) -> (DiGraph<NodeId, ()>, HashMap<NodeId, NodeIndex>) {
        let mut graph = DiGraph::new();
        let mut indices = HashMap::new();
        for id in self.nodes.keys() {
            indices.insert(id.clone(), graph.add_node(id.clone()));
        }
        for (node_id, node) in self.nodes {
            for line in self.lines(node) {
                let Some(link_id) = line.link_id else { continue };
                if let (Some(&from), Some(&to)) = (indices.get(link_id), indices.get(node_id)) {
                    graph.update_edge(from, to, ());
                }
            }
        }
        (graph, indices)
    }

    /// Every node upstream of `id`, including `id` itself.
    pub fn left_nodes(&self, id: &NodeId) -> Vec<NodeId> {
        let (graph, indices) = self.link_graph();
        let Some(&start) = indices.get(id) else {
            return Vec::new();
        };
        let reversed = Reversed(&graph);
        let mut dfs = Dfs::new(reversed, start);
        let mut out = Vec::new();
        while let Some(idx) = dfs.next(reversed) {
            out.push(graph[idx].clone());
        }
        out
    }

    /// Every node downstream of `id`, including `id` itself.
    pub fn right_nodes(&self, id: &NodeId) -> Vec<NodeId> {
        let (graph, indices) = self.link_graph();
        let Some(&start) = indices.get(id) else {
            return Vec::new();
        };
        let mut dfs = Dfs::new(&graph, start);
        let mut out = Vec::new();
        while let Some(idx) = dfs.next(&graph) {
            out.push(graph[idx].clone());
        }
        out
    }

    /// Whether linking `from`'s result into one of `to`'s properties keeps
    /// the scope acyclic, i.e. `to` is not upstream of (or equal to) `from`.
    pub fn can_link_to(&self, from: &NodeId, to: &NodeId) -> bool {
        let (graph, indices) = self.link_graph();
        match (indices.get(from), indices.get(to)) {
            (Some(&from_idx), Some(&to_idx)) => !has_path_connecting(&graph, to_idx, from_idx, None),
            _ => false,
        }
    }

    /// Nodes whose result nobody consumes.
    pub fn rightmost_nodes(&self) -> Vec<NodeId> {
        self.compute_link_map()
            .into_iter()
            .filter(|(_, consumers)| consumers.is_empty())
            .map(|(id, _)| id)
            .collect()
    }

    /// Nodes with neither inbound nor outbound links.
    pub fn orphan_nodes(&self) -> Vec<NodeId> {
        self.compute_link_map()
            .into_iter()
            .filter(|(id, consumers)| consumers.is_empty() && self.dependencies(id).is_empty())
            .map(|(id, _)| id)
            .collect()
    }
}
