use anyhow::Result;
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::time::Instant;

use panaroo_update::rewrite::OutputLayout;
use panaroo_update::{run, UpdateConfig};

/// panaroo-update - place Panaroo refound genes on isolate assemblies
///
/// Uses a Panaroo graph and its per-gene alignments to locate refound genes in
/// each isolate's contigs and writes updated GFF files
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Directory of GFF files to be updated
    #[clap(short = 'd', long = "gff-directory", alias = "gff_directory")]
    gff_dir: PathBuf,

    /// Directory of Panaroo per-gene alignments (<gene>.aln.fas or <gene>.fasta)
    #[clap(short = 'a', long = "alignment-directory", alias = "alignement_dir")]
    aln_dir: PathBuf,

    /// Panaroo-updated "all_annotations.csv" file
    #[clap(short = 'i', long = "input")]
    all_file: PathBuf,

    /// Directory of the Panaroo graph (final_graph.gml)
    #[clap(short = 'g', long = "graph-directory", alias = "graph_dir")]
    graph_dir: PathBuf,

    /// Output directory for updated GFF files (defaults to the GFF directory)
    #[clap(long = "output")]
    output_dir: Option<PathBuf>,

    /// Output layout: "per-contig" (one block per region) or "merged" (single GFF3)
    #[clap(long = "layout", default_value = "per-contig")]
    layout: OutputLayout,

    /// Warn and skip isolates whose GFF is malformed instead of aborting
    #[clap(long = "skip-malformed")]
    skip_malformed: bool,

    /// Number of threads for reading alignments
    #[clap(short = 't', long = "threads", default_value = "4")]
    threads: usize,

    /// Quiet mode (warnings only, no progress bar)
    #[clap(long = "quiet")]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();

    rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build_global()?;

    let start = Instant::now();

    let mut config =
        UpdateConfig::new(&args.gff_dir, &args.aln_dir, &args.all_file, &args.graph_dir);
    if let Some(output_dir) = args.output_dir {
        config.output_dir = output_dir;
    }
    config.layout = args.layout;
    config.skip_malformed = args.skip_malformed;
    config.show_progress = !args.quiet;

    let summary = run(&config)?;
    if !summary.skipped.is_empty() {
        info!(
            "Skipped {} malformed isolates: {}",
            summary.skipped.len(),
            summary.skipped.join(", ")
        );
    }

    info!("Finished in {:.2}s", start.elapsed().as_secs_f64());
    Ok(())
}
