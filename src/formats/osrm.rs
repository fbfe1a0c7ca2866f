//! The `.osrm` artifact: the intermediate node-based graph.
//!
//! Layout (little-endian):
//!   n_nodes:    u32
//!   nodes:      n_nodes x { osm_id: u64, lat: i32, lon: i32 }
//!   n_barriers: u32
//!   barriers:   n_barriers x u32
//!   n_signals:  u32
//!   signals:    n_signals x u32
//!   n_edges:    u32
//!   edges:      n_edges x { source: u32, target: u32, name_id: u32,
//!                           weight: i32, flags: u32 }

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use super::write_atomic;
use crate::types::{NodeBasedEdge, NodeID, QueryNode};

pub struct OsrmData {
    pub nodes: Vec<QueryNode>,
    pub barriers: Vec<NodeID>,
    pub traffic_signals: Vec<NodeID>,
    pub edges: Vec<NodeBasedEdge>,
}

pub fn write<P: AsRef<Path>>(
    path: P,
    nodes: &[QueryNode],
    barriers: &[NodeID],
    traffic_signals: &[NodeID],
    edges: &[NodeBasedEdge],
) -> Result<()> {
    write_atomic(path.as_ref(), |writer| {
        writer.write_all(&(nodes.len() as u32).to_le_bytes())?;
        for node in nodes {
            writer.write_all(&node.osm_id.to_le_bytes())?;
            writer.write_all(&node.lat.to_le_bytes())?;
            writer.write_all(&node.lon.to_le_bytes())?;
        }

        writer.write_all(&(barriers.len() as u32).to_le_bytes())?;
        for barrier in barriers {
            writer.write_all(&barrier.to_le_bytes())?;
        }

        writer.write_all(&(traffic_signals.len() as u32).to_le_bytes())?;
        for signal in traffic_signals {
            writer.write_all(&signal.to_le_bytes())?;
        }

        writer.write_all(&(edges.len() as u32).to_le_bytes())?;
        for edge in edges {
            writer.write_all(&edge.source.to_le_bytes())?;
            writer.write_all(&edge.target.to_le_bytes())?;
            writer.write_all(&edge.name_id.to_le_bytes())?;
            writer.write_all(&edge.weight.to_le_bytes())?;
            writer.write_all(&edge.flags.to_le_bytes())?;
        }
        Ok(())
    })
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub fn read<P: AsRef<Path>>(path: P) -> Result<OsrmData> {
    let file = File::open(path.as_ref())
        .with_context(|| format!("Failed to open {}", path.as_ref().display()))?;
    let mut reader = BufReader::new(file);

    let n_nodes = read_u32(&mut reader)? as usize;
    let mut nodes = Vec::with_capacity(n_nodes);
    for _ in 0..n_nodes {
        let mut buf = [0u8; 16];
        reader.read_exact(&mut buf)?;
        nodes.push(QueryNode {
            osm_id: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            lat: i32::from_le_bytes(buf[8..12].try_into().unwrap()),
            lon: i32::from_le_bytes(buf[12..16].try_into().unwrap()),
        });
    }

    let n_barriers = read_u32(&mut reader)? as usize;
    let mut barriers = Vec::with_capacity(n_barriers);
    for _ in 0..n_barriers {
        barriers.push(read_u32(&mut reader)?);
    }

    let n_signals = read_u32(&mut reader)? as usize;
    let mut traffic_signals = Vec::with_capacity(n_signals);
    for _ in 0..n_signals {
        traffic_signals.push(read_u32(&mut reader)?);
    }

    let n_edges = read_u32(&mut reader)? as usize;
    let mut edges = Vec::with_capacity(n_edges);
    for _ in 0..n_edges {
        let mut buf = [0u8; 20];
        reader.read_exact(&mut buf)?;
        edges.push(NodeBasedEdge {
            source: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            target: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            name_id: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            weight: i32::from_le_bytes(buf[12..16].try_into().unwrap()),
            flags: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
        });
    }

    Ok(OsrmData {
        nodes,
        barriers,
        traffic_signals,
        edges,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TravelMode;
    use tempfile::TempDir;

    #[test]
    fn test_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("map.osrm");

        let nodes = vec![
            QueryNode { osm_id: 1, lat: 10, lon: 20 },
            QueryNode { osm_id: 2, lat: 30, lon: 40 },
        ];
        let barriers = vec![0];
        let signals = vec![1];
        let edges = vec![NodeBasedEdge::new(
            0,
            1,
            5,
            72,
            true,
            true,
            false,
            false,
            true,
            TravelMode::Driving,
        )];

        write(&path, &nodes, &barriers, &signals, &edges).unwrap();
        let data = read(&path).unwrap();

        assert_eq!(data.nodes, nodes);
        assert_eq!(data.barriers, barriers);
        assert_eq!(data.traffic_signals, signals);
        assert_eq!(data.edges, edges);
    }

    #[test]
    fn test_empty_sections() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.osrm");
        write(&path, &[], &[], &[], &[]).unwrap();
        let data = read(&path).unwrap();
        assert!(data.nodes.is_empty());
        assert!(data.edges.is_empty());
    }
}
