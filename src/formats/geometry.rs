//! The `.geometry` artifact: the side table of compressed edge geometry.
//!
//! Layout: FingerPrint, u32 n_offsets, n_offsets x u32 prefix sums,
//! u32 n_ids, n_ids x u64 OSM node ids. Entry `i` spans ids
//! `offsets[i]..offsets[i+1]` and holds the full forward chain (both
//! endpoints included) of the compressed edge with packed geometry id `i`.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use super::{fingerprint, write_atomic};
use crate::compress::geometry::CompressedSegment;
use crate::types::QueryNode;

pub fn write<P: AsRef<Path>>(
    path: P,
    geometries: &[Vec<CompressedSegment>],
    query_nodes: &[QueryNode],
) -> Result<()> {
    write_atomic(path.as_ref(), |writer| {
        fingerprint::write(writer)?;

        let n_offsets = geometries.len() as u32 + 1;
        writer.write_all(&n_offsets.to_le_bytes())?;
        let mut running = 0u32;
        writer.write_all(&running.to_le_bytes())?;
        for chain in geometries {
            running += chain.len() as u32;
            writer.write_all(&running.to_le_bytes())?;
        }

        writer.write_all(&running.to_le_bytes())?;
        for chain in geometries {
            for segment in chain {
                let osm_id = query_nodes[segment.node as usize].osm_id;
                writer.write_all(&osm_id.to_le_bytes())?;
            }
        }
        Ok(())
    })
}

pub fn read<P: AsRef<Path>>(path: P) -> Result<Vec<Vec<u64>>> {
    let file = File::open(path.as_ref())
        .with_context(|| format!("Failed to open {}", path.as_ref().display()))?;
    let mut reader = BufReader::new(file);
    fingerprint::read_and_validate(&mut reader, &path.as_ref().display().to_string())?;

    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    let n_offsets = u32::from_le_bytes(buf) as usize;
    let mut offsets = Vec::with_capacity(n_offsets);
    for _ in 0..n_offsets {
        reader.read_exact(&mut buf)?;
        offsets.push(u32::from_le_bytes(buf));
    }

    reader.read_exact(&mut buf)?;
    let n_ids = u32::from_le_bytes(buf) as usize;
    let mut ids = Vec::with_capacity(n_ids);
    for _ in 0..n_ids {
        let mut id_buf = [0u8; 8];
        reader.read_exact(&mut id_buf)?;
        ids.push(u64::from_le_bytes(id_buf));
    }

    let mut chains = Vec::with_capacity(n_offsets.saturating_sub(1));
    for window in offsets.windows(2) {
        chains.push(ids[window[0] as usize..window[1] as usize].to_vec());
    }
    Ok(chains)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("map.geometry");

        let query_nodes = vec![
            QueryNode { osm_id: 101, lat: 0, lon: 0 },
            QueryNode { osm_id: 102, lat: 0, lon: 0 },
            QueryNode { osm_id: 103, lat: 0, lon: 0 },
        ];
        let geometries = vec![
            vec![
                CompressedSegment { node: 0, weight: 0 },
                CompressedSegment { node: 1, weight: 5 },
                CompressedSegment { node: 2, weight: 5 },
            ],
            vec![
                CompressedSegment { node: 2, weight: 0 },
                CompressedSegment { node: 0, weight: 9 },
            ],
        ];

        write(&path, &geometries, &query_nodes).unwrap();
        let chains = read(&path).unwrap();
        assert_eq!(chains, vec![vec![101, 102, 103], vec![103, 101]]);
    }
}
