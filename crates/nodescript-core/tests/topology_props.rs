//! Property tests for evaluation order and cycle prevention.

use std::collections::HashSet;

use indexmap::IndexMap;
use proptest::prelude::*;
use proptest::sample::Index;

use nodescript_core::{Graph, GraphSpec, InMemoryLoader, NodeId, NodeSpec, PropSpec, Topology};

/// Builds a DAG where node `i` may only link to nodes `j < i`. The last node
/// is the root.
fn dag(links: &[Vec<Index>]) -> IndexMap<NodeId, NodeSpec> {
    let mut nodes = IndexMap::new();
    for (i, targets) in links.iter().enumerate() {
        let mut node = NodeSpec::new("Test.Node");
        if i > 0 {
            for (p, target) in targets.iter().enumerate() {
                let j = target.index(i);
                node = node.with_prop(format!("p{p}"), PropSpec::link(format!("n{j}")));
            }
        }
        nodes.insert(NodeId::new(format!("n{i}")), node);
    }
    nodes
}

fn dag_strategy() -> impl Strategy<Value = Vec<Vec<Index>>> {
    prop::collection::vec(prop::collection::vec(any::<Index>(), 0..4), 1..14)
}

proptest! {
    #[test]
    fn order_lists_every_ancestor_once_before_its_consumers(links in dag_strategy()) {
        let nodes = dag(&links);
        let topo = Topology::new(&nodes);
        let root = NodeId::new(format!("n{}", links.len() - 1));
        let order = topo.compute_order(&root);

        let unique: HashSet<&NodeId> = order.iter().collect();
        prop_assert_eq!(unique.len(), order.len());

        let ancestors: HashSet<NodeId> = topo.left_nodes(&root).into_iter().collect();
        let listed: HashSet<NodeId> = order.iter().cloned().collect();
        prop_assert_eq!(&ancestors, &listed);

        for (pos, id) in order.iter().enumerate() {
            for dep in topo.dependencies(id) {
                let dep_pos = order.iter().position(|n| n == dep).unwrap();
                prop_assert!(dep_pos < pos, "{} must precede {}", dep, id);
            }
        }
        prop_assert_eq!(order.last(), Some(&root));
    }

    #[test]
    fn linking_a_descendant_back_is_rejected_and_cleared(
        links in dag_strategy(),
        pick in any::<Index>(),
    ) {
        let nodes = dag(&links);
        let root = NodeId::new(format!("n{}", links.len() - 1));
        let topo = Topology::new(&nodes);
        let upstream = topo.left_nodes(&root);
        let a = upstream[pick.index(upstream.len())].clone();

        // `root` depends on `a` (or is `a`), so feeding root back into `a`
        // must be refused.
        prop_assert!(!topo.can_link_to(&root, &a));

        let spec = GraphSpec { root_node_id: root.clone(), nodes, ..Default::default() };
        let mut graph = Graph::new(spec, &InMemoryLoader::new());
        let kept = graph.set_link(&a, "back", &root, "").unwrap();
        prop_assert!(!kept);
        prop_assert!(graph.node(&a).unwrap().props["back"].link_id.is_none());
    }
}
