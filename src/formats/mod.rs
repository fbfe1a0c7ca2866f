//! Binary artifact formats.
//!
//! One module per artifact, all little-endian and tightly packed. Every
//! writer goes through `write_atomic`: the bytes land in a temp file next
//! to the destination and are renamed into place only on success, so a
//! failed run never leaves a partial artifact for the downstream stage.

pub mod crc64;
pub mod edge_lookup;
pub mod edges;
pub mod fingerprint;
pub mod geometry;
pub mod names;
pub mod node_map;
pub mod osrm;
pub mod restrictions;

use anyhow::{Context, Result};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Write a file atomically: temp file in the destination directory,
/// renamed over `path` after the writer closure succeeds.
pub fn write_atomic<F>(path: &Path, write_fn: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<tempfile::NamedTempFile>) -> Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file for {}", path.display()))?;

    let mut writer = BufWriter::new(tmp);
    write_fn(&mut writer)?;
    writer.flush()?;

    let tmp = writer
        .into_inner()
        .context("Failed to flush output buffer")?;
    tmp.persist(path)
        .with_context(|| format!("Failed to persist {}", path.display()))?;
    Ok(())
}

/// Write the timestamp artifact: the raw string, nothing else.
pub fn write_timestamp(path: &Path, timestamp: &str) -> Result<()> {
    write_atomic(path, |writer| {
        writer.write_all(timestamp.as_bytes())?;
        Ok(())
    })
}
