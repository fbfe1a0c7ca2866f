//! Extraction phase: parse the input map, evaluate the profile per entity
//! in parallel, run the staging join, and emit the intermediate artifacts
//! (.osrm, .restrictions, .names, .timestamp).

pub mod containers;
pub mod names;
pub mod restrictions;
pub mod spill;

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use sha2::{Digest as Sha2Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::formats;
use crate::profile::{load_profile, ExtractionNode, ExtractionWay};
use crate::reader::{Entity, OsmReader};

use containers::ExtractionContainers;

/// Default record count above which staging sorts spill to disk.
pub const DEFAULT_SPILL_THRESHOLD: usize = 64_000_000;

pub struct ExtractConfig {
    pub input: PathBuf,
    pub profile: String,
    pub outdir: PathBuf,
    pub threads: usize,
    pub spill_threshold: usize,
}

pub struct ExtractResult {
    pub osrm_path: PathBuf,
    pub restrictions_path: PathBuf,
    pub names_path: PathBuf,
    pub timestamp_path: PathBuf,
    pub n_nodes: u64,
    pub n_edges: u64,
    pub n_restrictions: u64,
}

enum ParseOutcome {
    Node(ExtractionNode),
    Way(ExtractionWay),
    Restriction(Option<crate::types::InputRestriction>),
    Failed(String),
}

/// Artifact base name: the input file name with its map suffixes removed.
pub fn output_base(input: &Path) -> String {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "map".to_string());
    for suffix in [".osm.pbf", ".pbf", ".osm"] {
        if let Some(stripped) = name.strip_suffix(suffix) {
            return stripped.to_string();
        }
    }
    name
}

fn compute_file_sha256<P: AsRef<Path>>(path: P) -> Result<[u8; 32]> {
    use std::io::Read;

    let mut file = std::fs::File::open(path.as_ref())
        .with_context(|| format!("Failed to open {} for hashing", path.as_ref().display()))?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    let mut hash = [0u8; 32];
    hash.copy_from_slice(&hasher.finalize());
    Ok(hash)
}

pub fn run_extract(config: ExtractConfig) -> Result<ExtractResult> {
    let start_time = Instant::now();

    println!("🛣  Starting extraction");
    println!("📂 Input: {}", config.input.display());
    println!("📂 Output: {}", config.outdir.display());
    println!("🧭 Profile: {}", config.profile);

    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let n_threads = config.threads.clamp(1, available);
    println!("🧵 Threads: {}", n_threads);
    println!();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads)
        .build()
        .context("Failed to build thread pool")?;

    let factory = load_profile(&config.profile)?;

    // The setup hook runs once, on a designated instance, before fan-out.
    let mut setup_runtime = factory.create();
    setup_runtime
        .source_function()
        .context("Profile setup hook failed")?;
    let properties = setup_runtime.properties();
    println!(
        "  ✓ Profile loaded: traffic_signal_penalty={}ds u_turn_penalty={}ds turn_function={}",
        properties.traffic_signal_penalty, properties.u_turn_penalty, properties.has_turn_function
    );

    println!("Computing input file SHA-256...");
    let input_sha = compute_file_sha256(&config.input)?;
    println!("  ✓ SHA-256: {}", hex::encode(input_sha));

    std::fs::create_dir_all(&config.outdir)
        .context("Failed to create output directory")?;

    let base = output_base(&config.input);
    let timestamp_path = config.outdir.join(format!("{}.timestamp", base));
    let osrm_path = config.outdir.join(format!("{}.osrm", base));
    let restrictions_path = config.outdir.join(format!("{}.restrictions", base));
    let names_path = config.outdir.join(format!("{}.names", base));

    println!("Parsing in progress...");
    let parse_start = Instant::now();

    let mut reader = OsmReader::open(&config.input)?;
    let mut extraction = ExtractionContainers::new();

    let mut n_nodes = 0u64;
    let mut n_ways = 0u64;
    let mut n_relations = 0u64;
    let mut n_others = 0u64;
    let mut n_profile_errors = 0u64;

    while let Some(buffer) = reader.next_buffer()? {
        n_others += buffer.other_count;

        // Parallel classification, one profile runtime per worker; the
        // (index, outcome) pairs restore input order for the post-pass.
        let mut results: Vec<(usize, ParseOutcome)> = pool.install(|| {
            buffer
                .entities
                .par_iter()
                .enumerate()
                .map_init(
                    || factory.create(),
                    |runtime, (idx, entity)| {
                        let outcome = match entity {
                            Entity::Node(node) => {
                                let mut out = ExtractionNode::default();
                                match runtime.node_function(node, &mut out) {
                                    Ok(()) => ParseOutcome::Node(out),
                                    Err(e) => ParseOutcome::Failed(format!(
                                        "node {}: {:#}",
                                        node.id, e
                                    )),
                                }
                            }
                            Entity::Way(way) => {
                                let mut out = ExtractionWay::default();
                                match runtime.way_function(way, &mut out) {
                                    Ok(()) => ParseOutcome::Way(out),
                                    Err(e) => {
                                        ParseOutcome::Failed(format!("way {}: {:#}", way.id, e))
                                    }
                                }
                            }
                            Entity::Relation(relation) => ParseOutcome::Restriction(
                                restrictions::parse_restriction(relation),
                            ),
                        };
                        (idx, outcome)
                    },
                )
                .collect()
        });
        results.sort_unstable_by_key(|(idx, _)| *idx);

        // Single-writer post-pass in original element order.
        for (idx, outcome) in results {
            match (&buffer.entities[idx], outcome) {
                (Entity::Node(node), ParseOutcome::Node(result)) => {
                    n_nodes += 1;
                    extraction.process_node(node, &result);
                }
                (Entity::Way(way), ParseOutcome::Way(result)) => {
                    n_ways += 1;
                    extraction.process_way(way, &result);
                }
                (Entity::Relation(_), ParseOutcome::Restriction(result)) => {
                    n_relations += 1;
                    extraction.process_restriction(result);
                }
                (_, ParseOutcome::Failed(message)) => {
                    n_profile_errors += 1;
                    println!("  ⚠ Profile error, entity skipped: {}", message);
                }
                _ => {}
            }
        }
    }

    println!(
        "  ✓ Parsed {} nodes, {} ways, {} relations, {} other entities in {:.2}s",
        n_nodes,
        n_ways,
        n_relations,
        n_others,
        parse_start.elapsed().as_secs_f64()
    );
    if n_profile_errors > 0 {
        println!("  ⚠ {} entities skipped on profile errors", n_profile_errors);
    }

    formats::write_timestamp(&timestamp_path, reader.timestamp())?;
    println!("  ✓ Wrote {}", timestamp_path.display());

    println!("Joining nodes and edges...");
    let (data, stats) = pool.install(|| extraction.prepare_data(config.spill_threshold))?;
    if stats.dropped_source_edges + stats.dropped_target_edges > 0 {
        println!(
            "  ⚠ Dropped {} edges referencing unknown nodes",
            stats.dropped_source_edges + stats.dropped_target_edges
        );
    }
    if stats.dropped_restrictions > 0 {
        println!(
            "  ⚠ Dropped {} unresolvable restrictions",
            stats.dropped_restrictions
        );
    }

    if data.edges.is_empty() {
        println!("⚠ The input data produced no edges, exiting.");
        bail!("empty extraction result");
    }
    println!(
        "  ✓ {} nodes, {} edges, {} barriers, {} traffic lights, {} restrictions",
        data.nodes.len(),
        data.edges.len(),
        data.barriers.len(),
        data.traffic_signals.len(),
        data.restrictions.len()
    );

    println!("Writing output files...");
    formats::osrm::write(
        &osrm_path,
        &data.nodes,
        &data.barriers,
        &data.traffic_signals,
        &data.edges,
    )?;
    println!("  ✓ Wrote {}", osrm_path.display());

    formats::restrictions::write(&restrictions_path, &data.restrictions)?;
    println!("  ✓ Wrote {}", restrictions_path.display());

    formats::names::write(&names_path, &extraction.names)?;
    println!("  ✓ Wrote {}", names_path.display());

    println!();
    println!("✅ Extraction finished after {:.2}s", start_time.elapsed().as_secs_f64());

    Ok(ExtractResult {
        osrm_path,
        restrictions_path,
        names_path,
        timestamp_path,
        n_nodes: data.nodes.len() as u64,
        n_edges: data.edges.len() as u64,
        n_restrictions: data.restrictions.len() as u64,
    })
}
