//! CLI surface: the pipeline phases as subcommands.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::expand::{run_expand, ExpandConfig};
use crate::extract::{run_extract, ExtractConfig, DEFAULT_SPILL_THRESHOLD};
use crate::reweight::{run_reweight, ReweightConfig};

#[derive(Parser)]
#[command(name = "turnpike")]
#[command(about = "OSM routing-graph preprocessing: extraction, compression, edge-expansion", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse an OSM file and emit the intermediate node-based graph
    Extract {
        /// Input map file (.osm.pbf)
        input: PathBuf,

        /// Profile to evaluate per node and way
        #[arg(short, long, default_value = "car")]
        profile: String,

        /// Output directory for .osrm, .restrictions, .names, .timestamp
        #[arg(short, long, default_value = ".")]
        outdir: PathBuf,

        /// Worker threads (capped at the hardware default)
        #[arg(short, long, default_value = "8")]
        threads: usize,

        /// Record count above which staging sorts spill to disk
        #[arg(long, default_value_t = DEFAULT_SPILL_THRESHOLD)]
        spill_threshold: usize,
    },

    /// Build the edge-expanded graph from extraction artifacts
    Expand {
        /// Path to the .osrm artifact
        #[arg(long)]
        osrm: PathBuf,

        /// Path to the .restrictions artifact
        #[arg(long)]
        restrictions: PathBuf,

        /// Output directory for the edge-expanded artifacts
        #[arg(short, long, default_value = ".")]
        outdir: PathBuf,

        /// Profile supplying turn penalties
        #[arg(short, long, default_value = "car")]
        profile: String,

        /// Worker threads (capped at the hardware default)
        #[arg(short, long, default_value = "8")]
        threads: usize,

        /// Also write .edge_segment_lookup / .edge_penalties for later
        /// re-weighting
        #[arg(long)]
        generate_edge_lookup: bool,
    },

    /// Re-weight an edge-expanded graph from a segment-speed CSV
    Reweight {
        /// Path to the .edges artifact
        #[arg(long)]
        edges: PathBuf,

        /// Path to the .edge_segment_lookup artifact
        #[arg(long)]
        segment_lookup: PathBuf,

        /// Path to the .edge_penalties artifact
        #[arg(long)]
        penalties: PathBuf,

        /// CSV with header from_osm,to_osm,speed_kmh
        #[arg(long)]
        segment_speeds: PathBuf,

        /// Where to write the re-weighted .edges artifact
        #[arg(long)]
        output: PathBuf,
    },
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Extract {
            input,
            profile,
            outdir,
            threads,
            spill_threshold,
        } => {
            run_extract(ExtractConfig {
                input,
                profile,
                outdir,
                threads,
                spill_threshold,
            })?;
        }
        Commands::Expand {
            osrm,
            restrictions,
            outdir,
            profile,
            threads,
            generate_edge_lookup,
        } => {
            run_expand(ExpandConfig {
                osrm_path: osrm,
                restrictions_path: restrictions,
                outdir,
                profile,
                threads,
                generate_edge_lookup,
            })?;
        }
        Commands::Reweight {
            edges,
            segment_lookup,
            penalties,
            segment_speeds,
            output,
        } => {
            run_reweight(ReweightConfig {
                edges_path: edges,
                segment_lookup_path: segment_lookup,
                penalties_path: penalties,
                segment_speeds_path: segment_speeds,
                output_path: output,
            })?;
        }
    }
    Ok(())
}
