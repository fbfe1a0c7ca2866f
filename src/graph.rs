//! Dynamic node-based graph: adjacency over stable edge slots.
//!
//! Every undirected street segment is stored as two half-edges (u->v and
//! v->u); a half-edge's `forward` flag says whether the traversal in its
//! own direction is allowed. Edge slots are never reused, so geometry can
//! be keyed by edge id across compression.

use crate::types::{NodeBasedEdge, NodeID, TravelMode};

pub type EdgeID = u32;

/// Payload of one half-edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeData {
    pub weight: i32,
    pub name_id: u32,
    pub forward: bool,
    pub backward: bool,
    pub roundabout: bool,
    pub access_restricted: bool,
    pub startpoint: bool,
    pub travel_mode: TravelMode,
}

impl EdgeData {
    /// Chain-compression compatibility: all classification must match for
    /// two consecutive half-edges to fuse.
    pub fn is_compatible_to(&self, other: &EdgeData) -> bool {
        self.forward == other.forward
            && self.backward == other.backward
            && self.name_id == other.name_id
            && self.roundabout == other.roundabout
            && self.access_restricted == other.access_restricted
            && self.startpoint == other.startpoint
            && self.travel_mode == other.travel_mode
    }
}

#[derive(Debug, Clone)]
struct EdgeEntry {
    source: NodeID,
    target: NodeID,
    data: EdgeData,
    valid: bool,
}

pub struct NodeBasedGraph {
    adjacency: Vec<Vec<EdgeID>>,
    edges: Vec<EdgeEntry>,
}

impl NodeBasedGraph {
    /// Build from the extraction output. Each input edge becomes a pair of
    /// half-edges with mirrored direction flags.
    pub fn from_node_based_edges(n_nodes: usize, input: &[NodeBasedEdge]) -> Self {
        let mut graph = Self {
            adjacency: vec![Vec::new(); n_nodes],
            edges: Vec::with_capacity(input.len() * 2),
        };
        for edge in input {
            let data = EdgeData {
                weight: edge.weight,
                name_id: edge.name_id,
                forward: edge.forward(),
                backward: edge.backward(),
                roundabout: edge.roundabout(),
                access_restricted: edge.access_restricted(),
                startpoint: edge.startpoint(),
                travel_mode: edge.travel_mode(),
            };
            let mirrored = EdgeData {
                forward: data.backward,
                backward: data.forward,
                ..data
            };
            graph.add_edge(edge.source, edge.target, data);
            graph.add_edge(edge.target, edge.source, mirrored);
        }
        graph
    }

    pub fn num_nodes(&self) -> usize {
        self.adjacency.len()
    }

    pub fn num_edge_slots(&self) -> usize {
        self.edges.len()
    }

    pub fn add_edge(&mut self, source: NodeID, target: NodeID, data: EdgeData) -> EdgeID {
        let id = self.edges.len() as EdgeID;
        self.edges.push(EdgeEntry {
            source,
            target,
            data,
            valid: true,
        });
        self.adjacency[source as usize].push(id);
        id
    }

    /// Valid out-edges of a node, i.e. its current undirected degree.
    pub fn out_degree(&self, node: NodeID) -> usize {
        self.adjacency[node as usize]
            .iter()
            .filter(|&&e| self.edges[e as usize].valid)
            .count()
    }

    pub fn edges_of(&self, node: NodeID) -> impl Iterator<Item = EdgeID> + '_ {
        self.adjacency[node as usize]
            .iter()
            .copied()
            .filter(move |&e| self.edges[e as usize].valid)
    }

    pub fn source(&self, edge: EdgeID) -> NodeID {
        self.edges[edge as usize].source
    }

    pub fn target(&self, edge: EdgeID) -> NodeID {
        self.edges[edge as usize].target
    }

    pub fn data(&self, edge: EdgeID) -> &EdgeData {
        &self.edges[edge as usize].data
    }

    pub fn data_mut(&mut self, edge: EdgeID) -> &mut EdgeData {
        &mut self.edges[edge as usize].data
    }

    /// First valid half-edge from `source` to `target`.
    pub fn find_edge(&self, source: NodeID, target: NodeID) -> Option<EdgeID> {
        self.adjacency[source as usize]
            .iter()
            .copied()
            .find(|&e| self.edges[e as usize].valid && self.edges[e as usize].target == target)
    }

    /// Redirect a half-edge to a new target, keeping its slot (and with it
    /// any geometry keyed by the edge id).
    pub fn set_target(&mut self, edge: EdgeID, new_target: NodeID) {
        self.edges[edge as usize].target = new_target;
    }

    pub fn remove_edge(&mut self, edge: EdgeID) {
        let entry = &mut self.edges[edge as usize];
        entry.valid = false;
        let source = entry.source;
        self.adjacency[source as usize].retain(|&e| e != edge);
    }

    /// All valid half-edge ids, in slot order.
    pub fn valid_edges(&self) -> impl Iterator<Item = EdgeID> + '_ {
        self.edges
            .iter()
            .enumerate()
            .filter(|(_, e)| e.valid)
            .map(|(i, _)| i as EdgeID)
    }
}
