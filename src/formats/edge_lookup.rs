//! The `.edge_segment_lookup` / `.edge_penalties` artifacts.
//!
//! One variable-length record per emitted edge-expanded edge, in emission
//! order. The segment lookup stores the ordered OSM chain of the traversed
//! compressed edge with per-segment lengths and weights; the penalties
//! file stores the fixed (turn) share of the edge weight. Together they
//! allow re-weighting the `.edges` artifact from a segment-speed CSV
//! without re-running extraction.
//!
//! Segment lookup record:
//!   num_osm_nodes: u32
//!   first_osm_id:  u64
//!   (num_osm_nodes - 1) x { osm_id: u64, length_m: f64, weight: i32 }
//!
//! Penalties record: fixed_penalty: u32.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Write};
use std::path::Path;

use super::write_atomic;
use crate::ebg::EdgeLookupEntry;
use crate::geo;
use crate::types::QueryNode;

pub fn write<P: AsRef<Path>>(
    segment_lookup_path: P,
    penalties_path: P,
    entries: &[EdgeLookupEntry],
    query_nodes: &[QueryNode],
) -> Result<()> {
    write_atomic(segment_lookup_path.as_ref(), |writer| {
        for entry in entries {
            let chain = &entry.chain;
            writer.write_all(&(chain.len() as u32).to_le_bytes())?;
            writer.write_all(&query_nodes[chain[0].node as usize].osm_id.to_le_bytes())?;
            for pair in chain.windows(2) {
                let from = query_nodes[pair[0].node as usize];
                let to = query_nodes[pair[1].node as usize];
                let length = geo::great_circle_distance(from.coordinate(), to.coordinate());
                writer.write_all(&to.osm_id.to_le_bytes())?;
                writer.write_all(&length.to_le_bytes())?;
                writer.write_all(&pair[1].weight.to_le_bytes())?;
            }
        }
        Ok(())
    })?;

    write_atomic(penalties_path.as_ref(), |writer| {
        for entry in entries {
            writer.write_all(&entry.fixed_penalty.to_le_bytes())?;
        }
        Ok(())
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LookupSegment {
    pub osm_id: u64,
    pub length_m: f64,
    pub weight: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeSegments {
    pub first_osm_id: u64,
    pub segments: Vec<LookupSegment>,
}

fn try_read_u32<R: Read>(reader: &mut R) -> Result<Option<u32>> {
    let mut buf = [0u8; 4];
    match reader.read_exact(&mut buf) {
        Ok(()) => Ok(Some(u32::from_le_bytes(buf))),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn read_segment_lookup<P: AsRef<Path>>(path: P) -> Result<Vec<EdgeSegments>> {
    let file = File::open(path.as_ref())
        .with_context(|| format!("Failed to open {}", path.as_ref().display()))?;
    let mut reader = BufReader::new(file);

    let mut entries = Vec::new();
    while let Some(num_osm_nodes) = try_read_u32(&mut reader)? {
        let mut id_buf = [0u8; 8];
        reader.read_exact(&mut id_buf)?;
        let first_osm_id = u64::from_le_bytes(id_buf);

        let mut segments = Vec::with_capacity(num_osm_nodes.saturating_sub(1) as usize);
        for _ in 1..num_osm_nodes {
            let mut record = [0u8; 20];
            reader.read_exact(&mut record)?;
            segments.push(LookupSegment {
                osm_id: u64::from_le_bytes(record[0..8].try_into().unwrap()),
                length_m: f64::from_le_bytes(record[8..16].try_into().unwrap()),
                weight: i32::from_le_bytes(record[16..20].try_into().unwrap()),
            });
        }
        entries.push(EdgeSegments {
            first_osm_id,
            segments,
        });
    }
    Ok(entries)
}

pub fn read_penalties<P: AsRef<Path>>(path: P) -> Result<Vec<u32>> {
    let file = File::open(path.as_ref())
        .with_context(|| format!("Failed to open {}", path.as_ref().display()))?;
    let mut reader = BufReader::new(file);

    let mut penalties = Vec::new();
    while let Some(penalty) = try_read_u32(&mut reader)? {
        penalties.push(penalty);
    }
    Ok(penalties)
}
