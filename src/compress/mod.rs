//! Degree-2 chain compression of the node-based graph.
//!
//! A chain node collapses when both of its half-edge pairs carry matching
//! classification. Barrier nodes and restriction via nodes always survive;
//! traffic signals compress but charge their penalty into the fused
//! weight. Geometry of removed nodes is recorded per surviving edge slot.

pub mod geometry;

use std::collections::HashSet;

use crate::graph::NodeBasedGraph;
use crate::restriction_map::RestrictionMap;
use crate::types::NodeID;

use geometry::CompressedGeometryContainer;

#[derive(Debug, Default, Clone, Copy)]
pub struct CompressionStats {
    pub removed_nodes: u64,
}

pub struct GraphCompressor {
    traffic_signal_penalty: i32,
}

impl GraphCompressor {
    pub fn new(traffic_signal_penalty: i32) -> Self {
        Self {
            traffic_signal_penalty,
        }
    }

    pub fn compress(
        &self,
        barrier_nodes: &HashSet<NodeID>,
        traffic_signals: &HashSet<NodeID>,
        restriction_map: &mut RestrictionMap,
        graph: &mut NodeBasedGraph,
        geometry: &mut CompressedGeometryContainer,
    ) -> CompressionStats {
        let mut stats = CompressionStats::default();

        for v in 0..graph.num_nodes() as NodeID {
            if barrier_nodes.contains(&v) || restriction_map.is_via_node(v) {
                continue;
            }
            if graph.out_degree(v) != 2 {
                continue;
            }

            let mut out = graph.edges_of(v);
            let forward_e2 = out.next().expect("degree checked");
            let reverse_e2 = out.next().expect("degree checked");
            drop(out);

            let w = graph.target(forward_e2);
            let u = graph.target(reverse_e2);
            if u == w || u == v || w == v {
                continue;
            }

            let Some(forward_e1) = graph.find_edge(u, v) else {
                continue;
            };
            let Some(reverse_e1) = graph.find_edge(w, v) else {
                continue;
            };

            let fwd_data1 = *graph.data(forward_e1);
            let fwd_data2 = *graph.data(forward_e2);
            let rev_data1 = *graph.data(reverse_e1);
            let rev_data2 = *graph.data(reverse_e2);

            if !fwd_data1.is_compatible_to(&fwd_data2) || !rev_data1.is_compatible_to(&rev_data2) {
                continue;
            }

            // The signal penalty attaches to the segment arriving at v, so
            // per-segment weights still sum to the fused edge weight.
            let signal_penalty = if traffic_signals.contains(&v) {
                self.traffic_signal_penalty
            } else {
                0
            };
            let forward_weight1 = fwd_data1.weight + signal_penalty;
            let forward_weight2 = fwd_data2.weight;
            let reverse_weight1 = rev_data1.weight + signal_penalty;
            let reverse_weight2 = rev_data2.weight;

            graph.data_mut(forward_e1).weight = forward_weight1 + forward_weight2;
            graph.data_mut(reverse_e1).weight = reverse_weight1 + reverse_weight2;
            graph.set_target(forward_e1, w);
            graph.set_target(reverse_e1, u);

            geometry.compress_edge(forward_e1, forward_e2, v, w, forward_weight1, forward_weight2);
            geometry.compress_edge(reverse_e1, reverse_e2, v, u, reverse_weight1, reverse_weight2);

            graph.remove_edge(forward_e2);
            graph.remove_edge(reverse_e2);

            restriction_map.fixup_arriving(u, v, w);
            restriction_map.fixup_starting(u, v, w);
            restriction_map.fixup_arriving(w, v, u);
            restriction_map.fixup_starting(w, v, u);

            stats.removed_nodes += 1;
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NodeBasedEdge, TravelMode, TurnRestriction};

    fn edge(source: NodeID, target: NodeID, weight: i32) -> NodeBasedEdge {
        NodeBasedEdge::new(
            source,
            target,
            0,
            weight,
            true,
            true,
            false,
            false,
            true,
            TravelMode::Driving,
        )
    }

    fn compress_graph(
        n_nodes: usize,
        edges: &[NodeBasedEdge],
        barriers: &[NodeID],
        signals: &[NodeID],
        restrictions: &[TurnRestriction],
        signal_penalty: i32,
    ) -> (
        NodeBasedGraph,
        CompressedGeometryContainer,
        RestrictionMap,
        CompressionStats,
    ) {
        let mut graph = NodeBasedGraph::from_node_based_edges(n_nodes, edges);
        let mut geometry = CompressedGeometryContainer::new();
        let mut restriction_map = RestrictionMap::new(restrictions);
        let stats = GraphCompressor::new(signal_penalty).compress(
            &barriers.iter().copied().collect(),
            &signals.iter().copied().collect(),
            &mut restriction_map,
            &mut graph,
            &mut geometry,
        );
        (graph, geometry, restriction_map, stats)
    }

    #[test]
    fn test_chain_collapses_to_single_edge() {
        // A(0) - B(1) - C(2) - D(3), uniform weights.
        let edges = [edge(0, 1, 10), edge(1, 2, 20), edge(2, 3, 30)];
        let (graph, geometry, _, stats) = compress_graph(4, &edges, &[], &[], &[], 0);

        assert_eq!(stats.removed_nodes, 2);
        assert_eq!(graph.out_degree(0), 1);
        assert_eq!(graph.out_degree(1), 0);
        assert_eq!(graph.out_degree(2), 0);
        assert_eq!(graph.out_degree(3), 1);

        let fused = graph.find_edge(0, 3).unwrap();
        assert_eq!(graph.data(fused).weight, 60);

        let chain = geometry.full_chain(fused, 0, 3, 60);
        let nodes: Vec<NodeID> = chain.iter().map(|s| s.node).collect();
        assert_eq!(nodes, vec![0, 1, 2, 3]);
        assert_eq!(chain.iter().map(|s| s.weight).sum::<i32>(), 60);

        let rev = graph.find_edge(3, 0).unwrap();
        assert_eq!(graph.data(rev).weight, 60);
    }

    #[test]
    fn test_traffic_signal_adds_penalty_but_compresses() {
        // A - B - C with a signal at B; penalty 20 deci-seconds.
        let edges = [edge(0, 1, 10), edge(1, 2, 20)];
        let (graph, geometry, _, stats) = compress_graph(3, &edges, &[], &[1], &[], 20);

        assert_eq!(stats.removed_nodes, 1);
        let fused = graph.find_edge(0, 2).unwrap();
        assert_eq!(graph.data(fused).weight, 10 + 20 + 20);

        let chain = geometry.full_chain(fused, 0, 2, 50);
        assert_eq!(chain.iter().map(|s| s.weight).sum::<i32>(), 50);
    }

    #[test]
    fn test_barrier_blocks_compression() {
        let edges = [edge(0, 1, 10), edge(1, 2, 20)];
        let (graph, _, _, stats) = compress_graph(3, &edges, &[1], &[], &[], 0);
        assert_eq!(stats.removed_nodes, 0);
        assert!(graph.find_edge(0, 2).is_none());
    }

    #[test]
    fn test_via_node_survives_compression() {
        let edges = [edge(0, 1, 10), edge(1, 2, 20)];
        let restrictions = [TurnRestriction::new(0, 1, 2, false)];
        let (graph, _, _, stats) = compress_graph(3, &edges, &[], &[], &restrictions, 0);
        assert_eq!(stats.removed_nodes, 0);
        assert!(graph.find_edge(0, 1).is_some());
        assert!(graph.find_edge(1, 2).is_some());
    }

    #[test]
    fn test_restriction_endpoint_is_reanchored() {
        // X(0) - V(1) - B(2) - C(3): restriction no (B -> V -> X); B is a
        // chain node and collapses into C.
        let edges = [edge(0, 1, 10), edge(1, 2, 20), edge(2, 3, 30)];
        let restrictions = [TurnRestriction::new(2, 1, 0, false)];
        let (graph, _, map, stats) = compress_graph(4, &edges, &[], &[], &restrictions, 0);

        assert_eq!(stats.removed_nodes, 1);
        assert!(graph.find_edge(1, 3).is_some());
        // The from-endpoint moved from the deleted node 2 to survivor 3.
        assert!(map.is_restricted(3, 1, 0));
        assert!(!map.is_restricted(2, 1, 0));
    }

    #[test]
    fn test_mismatched_names_do_not_fuse() {
        let mut e1 = edge(0, 1, 10);
        e1.name_id = 1;
        let e2 = edge(1, 2, 20);
        let (graph, _, _, stats) = compress_graph(3, &[e1, e2], &[], &[], &[], 0);
        assert_eq!(stats.removed_nodes, 0);
        assert!(graph.find_edge(0, 2).is_none());
    }

    #[test]
    fn test_oneway_chain_compresses() {
        let e1 =
            NodeBasedEdge::new(0, 1, 0, 10, true, false, false, false, true, TravelMode::Driving);
        let e2 =
            NodeBasedEdge::new(1, 2, 0, 20, true, false, false, false, true, TravelMode::Driving);
        let (graph, _, _, stats) = compress_graph(3, &[e1, e2], &[], &[], &[], 0);

        assert_eq!(stats.removed_nodes, 1);
        let fused = graph.find_edge(0, 2).unwrap();
        assert!(graph.data(fused).forward);
        assert!(!graph.data(fused).backward);
        let rev = graph.find_edge(2, 0).unwrap();
        assert!(!graph.data(rev).forward);
    }
}
