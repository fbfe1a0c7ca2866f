//! Format fingerprint: a 4-byte magic prefixing every edge-expanded
//! artifact, validated on read-back. Bump the trailing digit on any
//! layout change.

use anyhow::{bail, Context, Result};
use std::io::{Read, Write};

pub const FINGERPRINT: [u8; 4] = *b"TPK1";

pub fn write<W: Write>(writer: &mut W) -> Result<()> {
    writer.write_all(&FINGERPRINT)?;
    Ok(())
}

pub fn read_and_validate<R: Read>(reader: &mut R, what: &str) -> Result<()> {
    let mut found = [0u8; 4];
    reader
        .read_exact(&mut found)
        .with_context(|| format!("Failed to read fingerprint of {}", what))?;
    if found != FINGERPRINT {
        bail!(
            "Fingerprint mismatch in {}: expected {:02x?}, got {:02x?} (stale or foreign file?)",
            what,
            FINGERPRINT,
            found
        );
    }
    Ok(())
}
