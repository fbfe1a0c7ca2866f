//! Strongly connected components over the edge-expanded graph.
//!
//! The arc set is the directed closure of the emitted edge-based edges
//! plus unconditional forward<->reverse links per edge-based node, which
//! keeps both traversals of a bidirectional segment inside one component.
//! Component search is the iterative Tarjan from petgraph, so recursion
//! depth is never bounded by the thread stack.

use petgraph::graph::{DiGraph, NodeIndex};
use rayon::prelude::*;

use crate::types::{EdgeBasedEdge, EdgeBasedNode, SPECIAL_NODEID};

/// Components smaller than this are flagged tiny; query layers use the
/// flag to avoid snapping into disconnected islands.
const TINY_COMPONENT_SIZE: usize = 1000;

/// Assign component id and tiny flag to every edge-based node.
pub fn find_components(
    number_of_edge_based_nodes: u32,
    edges: &[EdgeBasedEdge],
    nodes: &mut [EdgeBasedNode],
) {
    let mut arcs: Vec<(u32, u32)> = Vec::with_capacity(edges.len() * 2 + nodes.len() * 2);
    for edge in edges {
        if edge.forward() {
            arcs.push((edge.source, edge.target));
        }
        if edge.backward() {
            arcs.push((edge.target, edge.source));
        }
    }
    for node in nodes.iter() {
        if node.reverse_edge_based_node_id != SPECIAL_NODEID {
            arcs.push((
                node.forward_edge_based_node_id,
                node.reverse_edge_based_node_id,
            ));
            arcs.push((
                node.reverse_edge_based_node_id,
                node.forward_edge_based_node_id,
            ));
        }
    }

    arcs.par_sort_unstable();
    arcs.dedup();

    let mut graph = DiGraph::<(), (), u32>::with_capacity(
        number_of_edge_based_nodes as usize,
        arcs.len(),
    );
    for _ in 0..number_of_edge_based_nodes {
        graph.add_node(());
    }
    for &(source, target) in &arcs {
        graph.add_edge(NodeIndex::new(source as usize), NodeIndex::new(target as usize), ());
    }

    let components = petgraph::algo::tarjan_scc(&graph);

    let mut component_of = vec![0u32; number_of_edge_based_nodes as usize];
    let mut component_size = vec![0usize; components.len()];
    for (idx, component) in components.iter().enumerate() {
        component_size[idx] = component.len();
        for &node in component {
            component_of[node.index()] = idx as u32;
        }
    }

    for node in nodes.iter_mut() {
        let component = component_of[node.forward_edge_based_node_id as usize];
        debug_assert!(
            node.reverse_edge_based_node_id == SPECIAL_NODEID
                || component == component_of[node.reverse_edge_based_node_id as usize],
            "forward and reverse traversal ended up in different components"
        );
        node.component.id = 1 + component;
        node.component.is_tiny = component_size[component as usize] < TINY_COMPONENT_SIZE;
    }
}
