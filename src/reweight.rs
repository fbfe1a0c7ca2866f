//! Re-weight an edge-expanded graph from a segment-speed CSV.
//!
//! Consumes the `.edge_segment_lookup` / `.edge_penalties` side channel:
//! for every edge, segments whose (from, to) OSM pair appears in the CSV
//! get their weight recomputed from the new speed, everything else keeps
//! its original weight, and the fixed turn penalty is re-added on top.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::formats;
use crate::types::{OSMNodeID, EdgeBasedEdge};

pub struct ReweightConfig {
    pub edges_path: PathBuf,
    pub segment_lookup_path: PathBuf,
    pub penalties_path: PathBuf,
    pub segment_speeds_path: PathBuf,
    pub output_path: PathBuf,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ReweightStats {
    pub n_edges: u64,
    pub n_updated_segments: u64,
}

const EXPECTED_HEADER: [&str; 3] = ["from_osm", "to_osm", "speed_kmh"];

fn load_segment_speeds(path: &PathBuf) -> Result<HashMap<(OSMNodeID, OSMNodeID), f64>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let headers = reader.headers()?.clone();
    if headers.iter().ne(EXPECTED_HEADER) {
        bail!(
            "Unexpected CSV header in {}: expected {:?}, got {:?}",
            path.display(),
            EXPECTED_HEADER,
            headers
        );
    }

    let mut speeds = HashMap::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() != 3 {
            bail!("Malformed CSV record on line {}", line + 2);
        }
        let from: u64 = record[0]
            .parse()
            .with_context(|| format!("Bad from_osm on line {}", line + 2))?;
        let to: u64 = record[1]
            .parse()
            .with_context(|| format!("Bad to_osm on line {}", line + 2))?;
        let speed: f64 = record[2]
            .parse()
            .with_context(|| format!("Bad speed_kmh on line {}", line + 2))?;
        if speed <= 0.0 {
            bail!("Non-positive speed on line {}", line + 2);
        }
        speeds.insert((from, to), speed);
    }
    Ok(speeds)
}

pub fn run_reweight(config: ReweightConfig) -> Result<ReweightStats> {
    println!("🛣  Re-weighting edge-expanded graph");
    println!("📂 Edges: {}", config.edges_path.display());
    println!("📂 Speeds: {}", config.segment_speeds_path.display());
    println!();

    let speeds = load_segment_speeds(&config.segment_speeds_path)?;
    println!("  ✓ Loaded {} segment speeds", speeds.len());

    let (mut edges, max_edge_id) = formats::edges::read(&config.edges_path)?;
    let lookups = formats::edge_lookup::read_segment_lookup(&config.segment_lookup_path)?;
    let penalties = formats::edge_lookup::read_penalties(&config.penalties_path)?;

    if lookups.len() != edges.len() || penalties.len() != edges.len() {
        bail!(
            "Lookup shape mismatch ({} edges, {} lookups, {} penalties); \
             was the graph built with --generate-edge-lookup?",
            edges.len(),
            lookups.len(),
            penalties.len()
        );
    }

    let mut stats = ReweightStats {
        n_edges: edges.len() as u64,
        ..Default::default()
    };

    for ((edge, lookup), &penalty) in edges.iter_mut().zip(&lookups).zip(&penalties) {
        let mut new_weight = 0i64;
        let mut previous = lookup.first_osm_id;
        for segment in &lookup.segments {
            match speeds.get(&(previous, segment.osm_id)) {
                Some(&speed_kmh) => {
                    new_weight += crate::geo::distance_weight(segment.length_m, speed_kmh) as i64;
                    stats.n_updated_segments += 1;
                }
                None => new_weight += segment.weight as i64,
            }
            previous = segment.osm_id;
        }
        *edge = EdgeBasedEdge::new(
            edge.source,
            edge.target,
            edge.edge_id,
            penalty as i32 + new_weight as i32,
            edge.forward(),
            edge.backward(),
        );
    }

    formats::edges::write(&config.output_path, &edges, max_edge_id)?;
    println!("  ✓ Wrote {}", config.output_path.display());
    println!(
        "✅ Re-weighted {} edges ({} segments updated)",
        stats.n_edges, stats.n_updated_segments
    );

    Ok(stats)
}
