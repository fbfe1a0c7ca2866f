//! The `.restrictions` artifact: resolved turn restrictions.
//!
//! Layout: FingerPrint, u32 count, count x { from: u32, via: u32,
//! to: u32, flags: u32 }.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use super::{fingerprint, write_atomic};
use crate::types::TurnRestriction;

pub fn write<P: AsRef<Path>>(path: P, restrictions: &[TurnRestriction]) -> Result<()> {
    write_atomic(path.as_ref(), |writer| {
        fingerprint::write(writer)?;
        writer.write_all(&(restrictions.len() as u32).to_le_bytes())?;
        for restriction in restrictions {
            writer.write_all(&restriction.from.to_le_bytes())?;
            writer.write_all(&restriction.via.to_le_bytes())?;
            writer.write_all(&restriction.to.to_le_bytes())?;
            writer.write_all(&restriction.flags.to_le_bytes())?;
        }
        Ok(())
    })
}

pub fn read<P: AsRef<Path>>(path: P) -> Result<Vec<TurnRestriction>> {
    let file = File::open(path.as_ref())
        .with_context(|| format!("Failed to open {}", path.as_ref().display()))?;
    let mut reader = BufReader::new(file);
    fingerprint::read_and_validate(&mut reader, &path.as_ref().display().to_string())?;

    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    let count = u32::from_le_bytes(buf) as usize;

    let mut restrictions = Vec::with_capacity(count);
    for _ in 0..count {
        let mut record = [0u8; 16];
        reader.read_exact(&mut record)?;
        restrictions.push(TurnRestriction {
            from: u32::from_le_bytes(record[0..4].try_into().unwrap()),
            via: u32::from_le_bytes(record[4..8].try_into().unwrap()),
            to: u32::from_le_bytes(record[8..12].try_into().unwrap()),
            flags: u32::from_le_bytes(record[12..16].try_into().unwrap()),
        });
    }
    Ok(restrictions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("map.restrictions");
        let restrictions = vec![
            TurnRestriction::new(1, 2, 3, false),
            TurnRestriction::new(4, 5, 6, true),
        ];
        write(&path, &restrictions).unwrap();
        assert_eq!(read(&path).unwrap(), restrictions);
    }

    #[test]
    fn test_bad_fingerprint_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("map.restrictions");
        std::fs::write(&path, b"BAD!\x00\x00\x00\x00").unwrap();
        assert!(read(&path).is_err());
    }
}
