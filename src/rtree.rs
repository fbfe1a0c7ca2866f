//! Packed spatial index over edge-based segments.
//!
//! Every edge-based node's geometry is cut into segments (consecutive
//! coordinate pairs); the segments are bulk-loaded into an rstar R-tree
//! and the resulting packed tree is flattened breadth-first: leaf records
//! to `.fileIndex`, internal nodes with child ranges to `.ramIndex`. Only
//! building is done here; lookup belongs to the query side.

use anyhow::{bail, Result};
use rstar::{ParentNode, RTree, RTreeNode, RTreeObject, AABB};
use std::collections::VecDeque;
use std::io::Write;
use std::path::Path;

use crate::compress::geometry::CompressedSegment;
use crate::formats;
use crate::formats::crc64;
use crate::types::{EdgeBasedNode, QueryNode};

pub const LEAF_RECORD_SIZE: usize = 32;
const RAM_NODE_RECORD_SIZE: usize = 28;

const FILE_INDEX_MAGIC: u32 = 0x4C454146; // "FAEL"
const RAM_INDEX_MAGIC: u32 = 0x54524545; // "EERT"
const VERSION: u16 = 1;

/// One indexed segment: endpoint coordinates plus the ids needed to reach
/// the owning edge-based node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeafSegment {
    pub lat1: i32,
    pub lon1: i32,
    pub lat2: i32,
    pub lon2: i32,
    pub forward_edge_based_node_id: u32,
    pub reverse_edge_based_node_id: u32,
    pub packed_geometry_id: u32,
}

impl LeafSegment {
    fn encode(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.lat1.to_le_bytes());
        buf[4..8].copy_from_slice(&self.lon1.to_le_bytes());
        buf[8..12].copy_from_slice(&self.lat2.to_le_bytes());
        buf[12..16].copy_from_slice(&self.lon2.to_le_bytes());
        buf[16..20].copy_from_slice(&self.forward_edge_based_node_id.to_le_bytes());
        buf[20..24].copy_from_slice(&self.reverse_edge_based_node_id.to_le_bytes());
        buf[24..28].copy_from_slice(&self.packed_geometry_id.to_le_bytes());
        buf[28..32].copy_from_slice(&[0u8; 4]); // reserved
    }
}

impl RTreeObject for LeafSegment {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.lon1.min(self.lon2) as f64, self.lat1.min(self.lat2) as f64],
            [self.lon1.max(self.lon2) as f64, self.lat1.max(self.lat2) as f64],
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RTreeStats {
    pub n_segments: u64,
    pub n_tree_nodes: u64,
}

/// Collect the indexable segments of all edge-based nodes.
pub fn collect_segments(
    nodes: &[EdgeBasedNode],
    geometries: &[Vec<CompressedSegment>],
    query_nodes: &[QueryNode],
) -> Vec<LeafSegment> {
    let mut segments = Vec::new();
    for node in nodes {
        let chain = &geometries[node.packed_geometry_id as usize];
        for pair in chain.windows(2) {
            let a = query_nodes[pair[0].node as usize];
            let b = query_nodes[pair[1].node as usize];
            segments.push(LeafSegment {
                lat1: a.lat,
                lon1: a.lon,
                lat2: b.lat,
                lon2: b.lon,
                forward_edge_based_node_id: node.forward_edge_based_node_id,
                reverse_edge_based_node_id: node.reverse_edge_based_node_id,
                packed_geometry_id: node.packed_geometry_id,
            });
        }
    }
    segments
}

struct FlatTreeNode {
    min_lat: i32,
    min_lon: i32,
    max_lat: i32,
    max_lon: i32,
    first_child: u32,
    child_count: u32,
    children_are_leaves: bool,
}

impl FlatTreeNode {
    fn encode(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.min_lat.to_le_bytes());
        buf[4..8].copy_from_slice(&self.min_lon.to_le_bytes());
        buf[8..12].copy_from_slice(&self.max_lat.to_le_bytes());
        buf[12..16].copy_from_slice(&self.max_lon.to_le_bytes());
        buf[16..20].copy_from_slice(&self.first_child.to_le_bytes());
        buf[20..24].copy_from_slice(&self.child_count.to_le_bytes());
        buf[24] = self.children_are_leaves as u8;
        buf[25..28].copy_from_slice(&[0u8; 3]); // reserved
    }
}

fn envelope_bounds(envelope: &AABB<[f64; 2]>) -> (i32, i32, i32, i32) {
    let lower = envelope.lower();
    let upper = envelope.upper();
    (lower[1] as i32, lower[0] as i32, upper[1] as i32, upper[0] as i32)
}

/// Build the packed tree and write both artifacts.
pub fn build_rtree<P: AsRef<Path>>(
    segments: Vec<LeafSegment>,
    ram_index_path: P,
    file_index_path: P,
) -> Result<RTreeStats> {
    let n_segments = segments.len() as u64;
    let tree = RTree::bulk_load(segments);

    // Breadth-first flattening. Children of one parent land contiguously,
    // leaves in the leaf file, inner nodes in the ram file.
    let mut flat_nodes: Vec<FlatTreeNode> = Vec::new();
    let mut leaf_records: Vec<LeafSegment> = Vec::new();
    let mut queue: VecDeque<&ParentNode<LeafSegment>> = VecDeque::new();
    queue.push_back(tree.root());
    // The root occupies slot 0; children slots are assigned on enqueue.
    let mut next_node_slot = 1u32;

    while let Some(parent) = queue.pop_front() {
        let children = parent.children();
        let mut leaves = 0usize;
        let mut parents = 0usize;
        for child in children {
            match child {
                RTreeNode::Leaf(_) => leaves += 1,
                RTreeNode::Parent(_) => parents += 1,
            }
        }
        if leaves > 0 && parents > 0 {
            bail!("Mixed tree level encountered during packing");
        }

        let (min_lat, min_lon, max_lat, max_lon) = envelope_bounds(&parent.envelope());
        let children_are_leaves = parents == 0;
        let (first_child, child_count) = if children_are_leaves {
            let first = leaf_records.len() as u32;
            for child in children {
                if let RTreeNode::Leaf(segment) = child {
                    leaf_records.push(*segment);
                }
            }
            (first, leaves as u32)
        } else {
            let first = next_node_slot;
            for child in children {
                if let RTreeNode::Parent(parent) = child {
                    queue.push_back(parent);
                    next_node_slot += 1;
                }
            }
            (first, parents as u32)
        };

        flat_nodes.push(FlatTreeNode {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
            first_child,
            child_count,
            children_are_leaves,
        });
    }

    write_file_index(file_index_path, &leaf_records)?;
    write_ram_index(ram_index_path, &flat_nodes)?;

    Ok(RTreeStats {
        n_segments,
        n_tree_nodes: flat_nodes.len() as u64,
    })
}

fn write_file_index<P: AsRef<Path>>(path: P, records: &[LeafSegment]) -> Result<()> {
    formats::write_atomic(path.as_ref(), |writer| {
        let mut digest = crc64::Digest::new();
        let mut header = Vec::with_capacity(16);
        header.extend_from_slice(&FILE_INDEX_MAGIC.to_le_bytes());
        header.extend_from_slice(&VERSION.to_le_bytes());
        header.extend_from_slice(&0u16.to_le_bytes()); // reserved
        header.extend_from_slice(&(records.len() as u64).to_le_bytes());
        writer.write_all(&header)?;
        digest.update(&header);

        let mut buf = [0u8; LEAF_RECORD_SIZE];
        for record in records {
            record.encode(&mut buf);
            writer.write_all(&buf)?;
            digest.update(&buf);
        }

        writer.write_all(&digest.finalize().to_le_bytes())?;
        Ok(())
    })
}

fn write_ram_index<P: AsRef<Path>>(path: P, nodes: &[FlatTreeNode]) -> Result<()> {
    formats::write_atomic(path.as_ref(), |writer| {
        let mut digest = crc64::Digest::new();
        let mut header = Vec::with_capacity(16);
        header.extend_from_slice(&RAM_INDEX_MAGIC.to_le_bytes());
        header.extend_from_slice(&VERSION.to_le_bytes());
        header.extend_from_slice(&0u16.to_le_bytes()); // reserved
        header.extend_from_slice(&(nodes.len() as u64).to_le_bytes());
        writer.write_all(&header)?;
        digest.update(&header);

        let mut buf = [0u8; RAM_NODE_RECORD_SIZE];
        for node in nodes {
            node.encode(&mut buf);
            writer.write_all(&buf)?;
            digest.update(&buf);
        }

        writer.write_all(&digest.finalize().to_le_bytes())?;
        Ok(())
    })
}
