//! The `.names` artifact: the deduplicated street-name pool.
//!
//! Layout: u32 n_offsets, n_offsets x u32 prefix sums, u32 n_bytes,
//! n_bytes characters.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use super::write_atomic;
use crate::extract::names::NameTable;

pub fn write<P: AsRef<Path>>(path: P, names: &NameTable) -> Result<()> {
    write_atomic(path.as_ref(), |writer| {
        let offsets = names.offsets();
        writer.write_all(&(offsets.len() as u32).to_le_bytes())?;
        for offset in offsets {
            writer.write_all(&offset.to_le_bytes())?;
        }
        let chars = names.char_data();
        writer.write_all(&(chars.len() as u32).to_le_bytes())?;
        writer.write_all(chars)?;
        Ok(())
    })
}

pub fn read<P: AsRef<Path>>(path: P) -> Result<(Vec<u32>, Vec<u8>)> {
    let file = File::open(path.as_ref())
        .with_context(|| format!("Failed to open {}", path.as_ref().display()))?;
    let mut reader = BufReader::new(file);

    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    let n_offsets = u32::from_le_bytes(buf) as usize;

    let mut offsets = Vec::with_capacity(n_offsets);
    for _ in 0..n_offsets {
        reader.read_exact(&mut buf)?;
        offsets.push(u32::from_le_bytes(buf));
    }

    reader.read_exact(&mut buf)?;
    let n_bytes = u32::from_le_bytes(buf) as usize;
    let mut chars = vec![0u8; n_bytes];
    reader.read_exact(&mut chars)?;

    Ok((offsets, chars))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("map.names");

        let mut table = NameTable::new();
        table.intern("Ringstrasse");
        table.intern("Pier 7");
        write(&path, &table).unwrap();

        let (offsets, chars) = read(&path).unwrap();
        assert_eq!(offsets, table.offsets());
        assert_eq!(chars, table.char_data());

        // Name 2 is recoverable from the prefix sums.
        let start = offsets[2] as usize;
        let end = offsets[3] as usize;
        assert_eq!(&chars[start..end], b"Pier 7");
    }
}
