//! External-memory sorting for the extraction join.
//!
//! Staging sequences can exceed RAM on planet-sized inputs. Below the
//! spill threshold a sort is a plain rayon parallel sort; above it the
//! sequence is cut into runs, each run is sorted in parallel and written
//! to an anonymous temp file as fixed-size little-endian records, and the
//! runs are merged back with a binary heap.

use anyhow::{Context, Result};
use rayon::prelude::*;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};

/// A fixed-size record that can be spilled to disk.
pub trait SpillRecord: Sized {
    const ENCODED_SIZE: usize;

    fn encode(&self, buf: &mut [u8]);
    fn decode(buf: &[u8]) -> Self;
}

struct RunReader<T> {
    reader: BufReader<File>,
    remaining: usize,
    buf: Vec<u8>,
    _marker: std::marker::PhantomData<T>,
}

impl<T: SpillRecord> RunReader<T> {
    fn new(file: File, remaining: usize) -> Self {
        Self {
            reader: BufReader::new(file),
            remaining,
            buf: vec![0u8; T::ENCODED_SIZE],
            _marker: std::marker::PhantomData,
        }
    }

    fn next(&mut self) -> Result<Option<T>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.reader
            .read_exact(&mut self.buf)
            .context("Failed to read spilled record")?;
        self.remaining -= 1;
        Ok(Some(T::decode(&self.buf)))
    }
}

/// Sort `items` by `key`, spilling to disk when the sequence exceeds
/// `spill_threshold` records.
pub fn sort_by_key<T, K, F>(items: &mut Vec<T>, spill_threshold: usize, key: F) -> Result<()>
where
    T: SpillRecord + Send,
    K: Ord + Send + Copy,
    F: Fn(&T) -> K + Sync + Send,
{
    if items.len() <= spill_threshold {
        items.par_sort_unstable_by_key(&key);
        return Ok(());
    }

    let run_len = spill_threshold.max(1);
    let mut runs: Vec<(File, usize)> = Vec::new();

    for chunk in items.chunks_mut(run_len) {
        chunk.par_sort_unstable_by_key(&key);

        let file = tempfile::tempfile().context("Failed to create spill file")?;
        let mut writer = BufWriter::new(file);
        let mut buf = vec![0u8; T::ENCODED_SIZE];
        for record in chunk.iter() {
            record.encode(&mut buf);
            writer.write_all(&buf)?;
        }
        let mut file = writer
            .into_inner()
            .context("Failed to flush spill file")?;
        file.seek(SeekFrom::Start(0))?;
        runs.push((file, chunk.len()));
    }

    let total = items.len();
    items.clear();
    items.shrink_to_fit();

    let mut readers: Vec<RunReader<T>> = runs
        .into_iter()
        .map(|(file, len)| RunReader::new(file, len))
        .collect();

    // Heap over (key, run index); ties broken by run index, which is fine
    // for an unstable sort.
    let mut heap: BinaryHeap<Reverse<(K, usize)>> = BinaryHeap::new();
    let mut heads: Vec<Option<T>> = Vec::with_capacity(readers.len());
    for (run, reader) in readers.iter_mut().enumerate() {
        let head = reader.next()?;
        if let Some(record) = &head {
            heap.push(Reverse((key(record), run)));
        }
        heads.push(head);
    }

    items.reserve(total);
    while let Some(Reverse((_, run))) = heap.pop() {
        let record = heads[run].take().expect("heap entry without head record");
        items.push(record);
        let next = readers[run].next()?;
        if let Some(record) = &next {
            heap.push(Reverse((key(record), run)));
        }
        heads[run] = next;
    }

    Ok(())
}
