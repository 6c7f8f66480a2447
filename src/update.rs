//! Whole-run driver: build the library once, then rewrite isolates in order
//!
//! Isolates are processed strictly one after another because the locus tag
//! counter must advance deterministically across the run. The order is the
//! sorted file name order of `<gff_dir>/*.gff`.

use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::annotations::{AnnotationTable, LOCUS_TAG_PREFIX};
use crate::error::UpdateError;
use crate::frequency::{gene_frequencies, write_gene_frequencies, FREQUENCY_FILE_NAME};
use crate::gml::PangenomeGraph;
use crate::library::GeneLibrary;
use crate::merge::LocusTagCounter;
use crate::rewrite::{IsolateRewriter, OutputLayout, RewriteSummary};

/// Run configuration
#[derive(Debug, Clone)]
pub struct UpdateConfig {
    pub gff_dir: PathBuf,          // -d/--gff_directory
    pub alignment_dir: PathBuf,    // -a/--alignment_dir
    pub annotation_table: PathBuf, // -i/--input
    pub graph_dir: PathBuf,        // -g/--graph_dir
    pub output_dir: PathBuf,       // --output, defaults to gff_dir
    pub layout: OutputLayout,
    pub skip_malformed: bool,
    pub show_progress: bool,
}

impl UpdateConfig {
    pub fn new(
        gff_dir: impl Into<PathBuf>,
        alignment_dir: impl Into<PathBuf>,
        annotation_table: impl Into<PathBuf>,
        graph_dir: impl Into<PathBuf>,
    ) -> Self {
        let gff_dir = gff_dir.into();
        UpdateConfig {
            output_dir: gff_dir.clone(),
            gff_dir,
            alignment_dir: alignment_dir.into(),
            annotation_table: annotation_table.into(),
            graph_dir: graph_dir.into(),
            layout: OutputLayout::default(),
            skip_malformed: false,
            show_progress: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub isolates: Vec<RewriteSummary>,
    /// Isolates skipped because their annotation file was malformed
    pub skipped: Vec<String>,
    pub seed_locus_tag: u64,
    pub last_locus_tag: u64,
}

impl RunSummary {
    pub fn placed(&self) -> usize {
        self.isolates.iter().map(|s| s.placed).sum()
    }

    pub fn candidates(&self) -> usize {
        self.isolates.iter().map(|s| s.candidates).sum()
    }
}

/// Isolate names of every `*.gff` in `dir`, sorted
pub fn discover_isolates(dir: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to list GFF directory: {}", dir.display()))?;

    let mut isolates = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("gff") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            isolates.push(stem.to_string());
        }
    }
    isolates.sort();
    Ok(isolates)
}

/// Create the output directory if needed and check it accepts new files
pub fn prepare_output_dir(dir: &Path) -> Result<()> {
    let unwritable = |reason: String| {
        anyhow!(UpdateError::OutputDirectoryUnwritable {
            path: dir.to_path_buf(),
            reason,
        })
    };

    fs::create_dir_all(dir).map_err(|e| unwritable(e.to_string()))?;
    tempfile::NamedTempFile::new_in(dir).map_err(|e| unwritable(e.to_string()))?;
    Ok(())
}

fn is_malformed_annotation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<UpdateError>(),
            Some(UpdateError::MalformedAnnotation { .. })
        )
    })
}

fn progress_bar(len: usize, visible: bool) -> Result<ProgressBar> {
    if !visible {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar().template("{spinner:.green} [{bar:40}] {pos}/{len} {msg}")?,
    );
    Ok(pb)
}

pub fn run(config: &UpdateConfig) -> Result<RunSummary> {
    prepare_output_dir(&config.output_dir)?;

    info!("Generating library...");
    let graph = PangenomeGraph::from_dir(&config.graph_dir)?;
    let library = GeneLibrary::build(&graph, &config.alignment_dir)?;
    info!(
        "Library generated: {} refound genes, {} occurrences",
        library.len(),
        library.total_occurrences()
    );

    let table = AnnotationTable::from_path(&config.annotation_table)?;
    let seed = table.last_locus_number()?;
    let mut counter = LocusTagCounter::seeded(seed);

    let isolates = discover_isolates(&config.gff_dir)?;
    info!("Updating annotations for {} isolates...", isolates.len());

    let rewriter = IsolateRewriter::new(&config.gff_dir, &config.output_dir, &library, &table)
        .with_layout(config.layout);

    let mut summary = RunSummary {
        seed_locus_tag: seed,
        ..Default::default()
    };

    let pb = progress_bar(isolates.len(), config.show_progress)?;
    for isolate in &isolates {
        pb.set_message(isolate.clone());
        match rewriter.rewrite(isolate, &mut counter) {
            Ok(isolate_summary) => summary.isolates.push(isolate_summary),
            Err(err) if config.skip_malformed && is_malformed_annotation(&err) => {
                warn!("skipping {isolate}: {err:#}");
                summary.skipped.push(isolate.clone());
            }
            Err(err) => return Err(err.context(format!("Failed to update isolate {isolate}"))),
        }
        pb.inc(1);
    }
    pb.finish_and_clear();
    summary.last_locus_tag = counter.last();

    info!("Calculating gene frequencies...");
    let frequencies = gene_frequencies(&graph);
    write_gene_frequencies(&config.output_dir.join(FREQUENCY_FILE_NAME), &frequencies)?;

    info!(
        "Placed {} of {} refound genes across {} isolates (locus tags up to {LOCUS_TAG_PREFIX}{})",
        summary.placed(),
        summary.candidates(),
        summary.isolates.len(),
        summary.last_locus_tag
    );

    Ok(summary)
}
