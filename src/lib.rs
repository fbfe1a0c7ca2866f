//! Turnpike: routing-graph preprocessing for OSM-style map data.
//!
//! Pipeline:
//! - Extract: parse entities, evaluate the profile per node/way in
//!   parallel, join way references against node coordinates, and emit the
//!   intermediate node-based graph (.osrm, .restrictions, .names).
//! - Expand: read the intermediate graph back, compress degree-2 chains
//!   preserving geometry, materialize the edge-expanded (dual) graph with
//!   turn penalties, assign strongly connected components, and build the
//!   packed spatial index.
//! - Reweight: recompute edge weights from a segment-speed CSV using the
//!   per-edge segment lookup side channel.
//!
//! The edge-expanded graph is what the downstream hierarchy/query stages
//! consume; its artifacts all carry a format fingerprint checked on read.

pub mod cli;
pub mod compress;
pub mod ebg;
pub mod expand;
pub mod extract;
pub mod formats;
pub mod geo;
pub mod graph;
pub mod profile;
pub mod reader;
pub mod restriction_map;
pub mod reweight;
pub mod rtree;
pub mod scc;
pub mod types;

pub use types::{
    EdgeBasedEdge, EdgeBasedNode, NodeBasedEdge, NodeID, QueryNode, TravelMode, TurnRestriction,
    SPECIAL_NODEID,
};
