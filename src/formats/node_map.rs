//! The `.nodes` artifact: internal node id to original node mapping.
//!
//! Layout: u32 count, count x QueryNode. Position is the internal id.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use super::write_atomic;
use crate::types::QueryNode;

pub fn write<P: AsRef<Path>>(path: P, nodes: &[QueryNode]) -> Result<()> {
    write_atomic(path.as_ref(), |writer| {
        writer.write_all(&(nodes.len() as u32).to_le_bytes())?;
        for node in nodes {
            writer.write_all(&node.osm_id.to_le_bytes())?;
            writer.write_all(&node.lat.to_le_bytes())?;
            writer.write_all(&node.lon.to_le_bytes())?;
        }
        Ok(())
    })
}

pub fn read<P: AsRef<Path>>(path: P) -> Result<Vec<QueryNode>> {
    let file = File::open(path.as_ref())
        .with_context(|| format!("Failed to open {}", path.as_ref().display()))?;
    let mut reader = BufReader::new(file);

    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    let count = u32::from_le_bytes(buf) as usize;

    let mut nodes = Vec::with_capacity(count);
    for _ in 0..count {
        let mut record = [0u8; 16];
        reader.read_exact(&mut record)?;
        nodes.push(QueryNode {
            osm_id: u64::from_le_bytes(record[0..8].try_into().unwrap()),
            lat: i32::from_le_bytes(record[8..12].try_into().unwrap()),
            lon: i32::from_le_bytes(record[12..16].try_into().unwrap()),
        });
    }
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("map.nodes");
        let nodes = vec![
            QueryNode { osm_id: 42, lat: -100, lon: 200 },
            QueryNode { osm_id: 43, lat: 300, lon: -400 },
        ];
        write(&path, &nodes).unwrap();
        assert_eq!(read(&path).unwrap(), nodes);
    }
}
