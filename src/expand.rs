//! Edge-expansion phase: read the intermediate artifacts back, compress
//! degree-2 chains, build the dual graph, analyze components, and write
//! every edge-expanded artifact including the spatial index.

use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::compress::geometry::CompressedGeometryContainer;
use crate::compress::GraphCompressor;
use crate::ebg::EdgeBasedGraphFactory;
use crate::formats;
use crate::graph::NodeBasedGraph;
use crate::profile::load_profile;
use crate::restriction_map::RestrictionMap;
use crate::rtree;
use crate::scc;
use crate::types::NodeID;

pub struct ExpandConfig {
    pub osrm_path: PathBuf,
    pub restrictions_path: PathBuf,
    pub outdir: PathBuf,
    pub profile: String,
    pub threads: usize,
    pub generate_edge_lookup: bool,
}

pub struct ExpandResult {
    pub edges_path: PathBuf,
    pub geometry_path: PathBuf,
    pub nodes_path: PathBuf,
    pub ram_index_path: PathBuf,
    pub file_index_path: PathBuf,
    pub n_edge_based_nodes: u32,
    pub n_edge_based_edges: u64,
}

fn artifact_base(osrm_path: &Path) -> String {
    osrm_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "map".to_string())
}

pub fn run_expand(config: ExpandConfig) -> Result<ExpandResult> {
    let start_time = Instant::now();

    println!("🛣  Generating edge-expanded graph representation");
    println!("📂 Graph: {}", config.osrm_path.display());
    println!("📂 Output: {}", config.outdir.display());
    println!();

    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let n_threads = config.threads.clamp(1, available);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads)
        .build()
        .context("Failed to build thread pool")?;

    println!("Loading node-based graph...");
    let data = formats::osrm::read(&config.osrm_path)?;
    if data.edges.is_empty() {
        println!("⚠ The input data is empty, exiting.");
        bail!("empty node-based graph");
    }
    println!(
        "  ✓ {} nodes, {} edges, {} barrier nodes, {} traffic lights",
        data.nodes.len(),
        data.edges.len(),
        data.barriers.len(),
        data.traffic_signals.len()
    );

    let restrictions = formats::restrictions::read(&config.restrictions_path)?;
    println!("  ✓ {} restrictions", restrictions.len());

    let factory = load_profile(&config.profile)?;
    let mut runtime = factory.create();
    let properties = runtime.properties();

    let barrier_nodes: HashSet<NodeID> = data.barriers.iter().copied().collect();
    let traffic_signals: HashSet<NodeID> = data.traffic_signals.iter().copied().collect();

    let mut graph = NodeBasedGraph::from_node_based_edges(data.nodes.len(), &data.edges);
    let mut restriction_map = RestrictionMap::new(&restrictions);
    let mut geometry = CompressedGeometryContainer::new();

    println!("Compressing degree-2 chains...");
    let compression = GraphCompressor::new(properties.traffic_signal_penalty).compress(
        &barrier_nodes,
        &traffic_signals,
        &mut restriction_map,
        &mut graph,
        &mut geometry,
    );
    println!("  ✓ Removed {} chain nodes", compression.removed_nodes);

    println!("Building edge-expanded graph...");
    let ebg_factory = EdgeBasedGraphFactory::new(
        &graph,
        &geometry,
        &restriction_map,
        &barrier_nodes,
        &traffic_signals,
        &data.nodes,
        properties,
    );
    let (mut ebg, stats) = ebg_factory.run(&mut *runtime, config.generate_edge_lookup)?;
    println!(
        "  ✓ {} edge-based nodes, {} edge-based edges",
        ebg.number_of_edge_based_nodes,
        ebg.edges.len()
    );
    println!(
        "  ✓ Skipped {} restricted turns, {} u-turns, {} barrier turns, {} mode changes",
        stats.skipped_restricted_turns,
        stats.skipped_uturns,
        stats.skipped_barrier_turns,
        stats.skipped_mode_changes
    );

    println!("Finding strongly connected components...");
    pool.install(|| {
        scc::find_components(ebg.number_of_edge_based_nodes, &ebg.edges, &mut ebg.nodes)
    });
    let tiny = ebg.nodes.iter().filter(|n| n.component.is_tiny).count();
    println!(
        "  ✓ Components assigned ({} of {} segments in tiny components)",
        tiny,
        ebg.nodes.len()
    );

    std::fs::create_dir_all(&config.outdir)
        .context("Failed to create output directory")?;
    let base = artifact_base(&config.osrm_path);
    let edges_path = config.outdir.join(format!("{}.edges", base));
    let geometry_path = config.outdir.join(format!("{}.geometry", base));
    let nodes_path = config.outdir.join(format!("{}.nodes", base));
    let ram_index_path = config.outdir.join(format!("{}.ramIndex", base));
    let file_index_path = config.outdir.join(format!("{}.fileIndex", base));

    println!("Writing output files...");
    formats::edges::write(&edges_path, &ebg.edges, ebg.max_edge_based_node_id() as u64)?;
    println!("  ✓ Wrote {}", edges_path.display());

    formats::geometry::write(&geometry_path, &ebg.geometries, &data.nodes)?;
    println!("  ✓ Wrote {}", geometry_path.display());

    formats::node_map::write(&nodes_path, &data.nodes)?;
    println!("  ✓ Wrote {}", nodes_path.display());

    if let Some(lookup) = &ebg.lookup {
        let segment_lookup_path = config.outdir.join(format!("{}.edge_segment_lookup", base));
        let penalties_path = config.outdir.join(format!("{}.edge_penalties", base));
        formats::edge_lookup::write(&segment_lookup_path, &penalties_path, lookup, &data.nodes)?;
        println!("  ✓ Wrote {}", segment_lookup_path.display());
        println!("  ✓ Wrote {}", penalties_path.display());
    }

    println!("Building r-tree...");
    let segments = rtree::collect_segments(&ebg.nodes, &ebg.geometries, &data.nodes);
    let rtree_stats = rtree::build_rtree(segments, &ram_index_path, &file_index_path)?;
    println!(
        "  ✓ Indexed {} segments in {} tree nodes",
        rtree_stats.n_segments, rtree_stats.n_tree_nodes
    );
    println!("  ✓ Wrote {}", ram_index_path.display());
    println!("  ✓ Wrote {}", file_index_path.display());

    println!();
    println!(
        "✅ Edge expansion finished after {:.2}s",
        start_time.elapsed().as_secs_f64()
    );

    Ok(ExpandResult {
        edges_path,
        geometry_path,
        nodes_path,
        ram_index_path,
        file_index_path,
        n_edge_based_nodes: ebg.number_of_edge_based_nodes,
        n_edge_based_edges: ebg.edges.len() as u64,
    })
}
