//! Edge-based graph factory: materialize the dual graph in which every
//! directed traversal of a compressed node-based edge becomes a node and
//! every admissible movement becomes an arc carrying the turn penalty.

pub mod turn;

use anyhow::Result;
use std::collections::{HashMap, HashSet};

use crate::compress::geometry::{CompressedGeometryContainer, CompressedSegment};
use crate::graph::{EdgeID, NodeBasedGraph};
use crate::profile::{ProfileProperties, ProfileRuntime};
use crate::restriction_map::RestrictionMap;
use crate::types::{
    BoundingBox, EdgeBasedEdge, EdgeBasedNode, ComponentInfo, NodeID, QueryNode, SPECIAL_NODEID,
};

/// Per-arc side channel enabling later re-weighting: the ordered segment
/// chain of the traversed edge plus the fixed (turn) penalty.
pub struct EdgeLookupEntry {
    pub chain: Vec<CompressedSegment>,
    pub fixed_penalty: u32,
}

pub struct EdgeBasedGraph {
    pub nodes: Vec<EdgeBasedNode>,
    pub edges: Vec<EdgeBasedEdge>,
    /// Forward chains (endpoints included), indexed by packed geometry id.
    pub geometries: Vec<Vec<CompressedSegment>>,
    /// Number of allocated edge-based node ids.
    pub number_of_edge_based_nodes: u32,
    pub lookup: Option<Vec<EdgeLookupEntry>>,
}

impl EdgeBasedGraph {
    pub fn max_edge_based_node_id(&self) -> u32 {
        self.number_of_edge_based_nodes.saturating_sub(1)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FactoryStats {
    pub skipped_restricted_turns: u64,
    pub skipped_uturns: u64,
    pub skipped_barrier_turns: u64,
    pub skipped_mode_changes: u64,
}

#[derive(Clone, Copy)]
struct DirectedInfo {
    edge_based_node_id: u32,
    packed_geometry_id: u32,
}

pub struct EdgeBasedGraphFactory<'a> {
    graph: &'a NodeBasedGraph,
    geometry: &'a CompressedGeometryContainer,
    restriction_map: &'a RestrictionMap,
    barrier_nodes: &'a HashSet<NodeID>,
    traffic_signals: &'a HashSet<NodeID>,
    query_nodes: &'a [QueryNode],
    properties: ProfileProperties,
}

impl<'a> EdgeBasedGraphFactory<'a> {
    pub fn new(
        graph: &'a NodeBasedGraph,
        geometry: &'a CompressedGeometryContainer,
        restriction_map: &'a RestrictionMap,
        barrier_nodes: &'a HashSet<NodeID>,
        traffic_signals: &'a HashSet<NodeID>,
        query_nodes: &'a [QueryNode],
        properties: ProfileProperties,
    ) -> Self {
        Self {
            graph,
            geometry,
            restriction_map,
            barrier_nodes,
            traffic_signals,
            query_nodes,
            properties,
        }
    }

    pub fn run(
        &self,
        runtime: &mut dyn ProfileRuntime,
        generate_edge_lookup: bool,
    ) -> Result<(EdgeBasedGraph, FactoryStats)> {
        let (nodes, geometries, directed_info) = self.number_traversals();
        let number_of_edge_based_nodes =
            directed_info.values().map(|i| i.edge_based_node_id + 1).max().unwrap_or(0);

        let mut stats = FactoryStats::default();
        let mut edges = Vec::new();
        let mut lookup = generate_edge_lookup.then(Vec::new);

        for u in 0..self.graph.num_nodes() as NodeID {
            for e1 in self.graph.edges_of(u) {
                if !self.graph.data(e1).forward {
                    continue;
                }
                let v = self.graph.target(e1);
                let via_degree = self.graph.out_degree(v);

                for e2 in self.graph.edges_of(v) {
                    if !self.graph.data(e2).forward {
                        continue;
                    }
                    let w = self.graph.target(e2);

                    let ctx = turn::TurnContext {
                        from: u,
                        via: v,
                        to: w,
                        via_degree,
                        from_mode: self.graph.data(e1).travel_mode,
                        to_mode: self.graph.data(e2).travel_mode,
                        from_coord: self.query_nodes[u as usize].coordinate(),
                        via_coord: self.query_nodes[v as usize].coordinate(),
                        to_coord: self.query_nodes[w as usize].coordinate(),
                        restriction_map: self.restriction_map,
                        barrier_nodes: self.barrier_nodes,
                        traffic_signals: self.traffic_signals,
                        properties: self.properties,
                    };

                    let Some(delta) = turn::evaluate_turn(&ctx, runtime) else {
                        if self.restriction_map.is_restricted(u, v, w) {
                            stats.skipped_restricted_turns += 1;
                        } else if self.barrier_nodes.contains(&v) {
                            stats.skipped_barrier_turns += 1;
                        } else if u == w {
                            stats.skipped_uturns += 1;
                        } else {
                            stats.skipped_mode_changes += 1;
                        }
                        continue;
                    };

                    let info1 = directed_info[&e1];
                    let info2 = directed_info[&e2];
                    debug_assert_ne!(
                        info1.edge_based_node_id, info2.edge_based_node_id,
                        "self-loop in edge-expanded graph"
                    );

                    let weight = self.graph.data(e1).weight + delta;
                    edges.push(EdgeBasedEdge::new(
                        info1.edge_based_node_id,
                        info2.edge_based_node_id,
                        info1.packed_geometry_id,
                        weight,
                        true,
                        false,
                    ));

                    if let Some(lookup) = lookup.as_mut() {
                        lookup.push(EdgeLookupEntry {
                            chain: self.geometry.full_chain(
                                e1,
                                u,
                                v,
                                self.graph.data(e1).weight,
                            ),
                            fixed_penalty: delta as u32,
                        });
                    }
                }
            }
        }

        Ok((
            EdgeBasedGraph {
                nodes,
                edges,
                geometries,
                number_of_edge_based_nodes,
                lookup,
            },
            stats,
        ))
    }

    /// Allocate edge-based node ids: one per permitted directed traversal.
    /// The canonical orientation of a pair is its traversable direction,
    /// so `forward_edge_based_node_id` is always set.
    fn number_traversals(
        &self,
    ) -> (
        Vec<EdgeBasedNode>,
        Vec<Vec<CompressedSegment>>,
        HashMap<EdgeID, DirectedInfo>,
    ) {
        let mut nodes = Vec::new();
        let mut geometries = Vec::new();
        let mut directed_info = HashMap::new();
        let mut next_id = 0u32;
        // Parallel edges between the same node pair must pair up 1:1, so
        // a reverse half-edge is consumed once matched.
        let mut consumed_reverse: HashSet<EdgeID> = HashSet::new();

        for u in 0..self.graph.num_nodes() as NodeID {
            for e_fwd in self.graph.edges_of(u) {
                let v = self.graph.target(e_fwd);
                if u >= v {
                    continue; // each pair once
                }
                let Some(e_rev) = self
                    .graph
                    .edges_of(v)
                    .find(|&e| self.graph.target(e) == u && !consumed_reverse.contains(&e))
                else {
                    continue;
                };
                consumed_reverse.insert(e_rev);

                let fwd_allowed = self.graph.data(e_fwd).forward;
                let rev_allowed = self.graph.data(e_rev).forward;
                if !fwd_allowed && !rev_allowed {
                    continue;
                }

                let (a, b, e_ab, e_ba) = if fwd_allowed {
                    (u, v, e_fwd, e_rev)
                } else {
                    (v, u, e_rev, e_fwd)
                };

                let packed_geometry_id = geometries.len() as u32;
                let chain = self.geometry.full_chain(e_ab, a, b, self.graph.data(e_ab).weight);

                let mut bbox = BoundingBox::invalid();
                for segment in &chain {
                    bbox.extend(self.query_nodes[segment.node as usize].coordinate());
                }

                let forward_id = next_id;
                next_id += 1;
                directed_info.insert(
                    e_ab,
                    DirectedInfo {
                        edge_based_node_id: forward_id,
                        packed_geometry_id,
                    },
                );

                let reverse_id = if self.graph.data(e_ba).forward {
                    let id = next_id;
                    next_id += 1;
                    directed_info.insert(
                        e_ba,
                        DirectedInfo {
                            edge_based_node_id: id,
                            packed_geometry_id,
                        },
                    );
                    id
                } else {
                    SPECIAL_NODEID
                };

                geometries.push(chain);
                nodes.push(EdgeBasedNode {
                    forward_edge_based_node_id: forward_id,
                    reverse_edge_based_node_id: reverse_id,
                    bbox,
                    packed_geometry_id,
                    component: ComponentInfo::default(),
                });
            }
        }

        (nodes, geometries, directed_info)
    }
}
