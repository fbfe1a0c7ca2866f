//! The `.edges` artifact: the edge-expanded graph.
//!
//! Layout: FingerPrint, u64 n_edges, u64 max_edge_id, n_edges x
//! { source: u32, target: u32, edge_id: u32, weight_flags: u32 }.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use super::{fingerprint, write_atomic};
use crate::types::EdgeBasedEdge;

pub fn write<P: AsRef<Path>>(
    path: P,
    edges: &[EdgeBasedEdge],
    max_edge_id: u64,
) -> Result<()> {
    write_atomic(path.as_ref(), |writer| {
        fingerprint::write(writer)?;
        writer.write_all(&(edges.len() as u64).to_le_bytes())?;
        writer.write_all(&max_edge_id.to_le_bytes())?;
        for edge in edges {
            writer.write_all(&edge.source.to_le_bytes())?;
            writer.write_all(&edge.target.to_le_bytes())?;
            writer.write_all(&edge.edge_id.to_le_bytes())?;
            writer.write_all(&edge.raw_weight_flags().to_le_bytes())?;
        }
        Ok(())
    })
}

pub fn read<P: AsRef<Path>>(path: P) -> Result<(Vec<EdgeBasedEdge>, u64)> {
    let file = File::open(path.as_ref())
        .with_context(|| format!("Failed to open {}", path.as_ref().display()))?;
    let mut reader = BufReader::new(file);
    fingerprint::read_and_validate(&mut reader, &path.as_ref().display().to_string())?;

    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    let n_edges = u64::from_le_bytes(buf) as usize;
    reader.read_exact(&mut buf)?;
    let max_edge_id = u64::from_le_bytes(buf);

    let mut edges = Vec::with_capacity(n_edges);
    for _ in 0..n_edges {
        let mut record = [0u8; 16];
        reader.read_exact(&mut record)?;
        edges.push(EdgeBasedEdge::from_raw(
            u32::from_le_bytes(record[0..4].try_into().unwrap()),
            u32::from_le_bytes(record[4..8].try_into().unwrap()),
            u32::from_le_bytes(record[8..12].try_into().unwrap()),
            u32::from_le_bytes(record[12..16].try_into().unwrap()),
        ));
    }
    Ok((edges, max_edge_id))
}
