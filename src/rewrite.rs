/// Rewrite one isolate's GFF with its refound genes merged in
use anyhow::{anyhow, Context, Result};
use log::{debug, warn};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tempfile::NamedTempFile;

use crate::annotations::AnnotationTable;
use crate::error::UpdateError;
use crate::gff::{FeatureRow, GffDocument, SequenceRegion, FASTA_MARKER};
use crate::library::GeneLibrary;
use crate::locate::Contig;
use crate::merge::{merge_contig, place_candidates, resolve_library_hits, LocusTagCounter};

/// How the rewritten file is laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputLayout {
    /// One block per region: its declaration, its rows, then `##FASTA` and the
    /// whole original sequence section. Matches what Panaroo's updater writes.
    #[default]
    PerContig,
    /// A single GFF3 document: directives, all declarations, all rows, one
    /// `##FASTA` section
    Merged,
}

impl FromStr for OutputLayout {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "per-contig" | "contig" => Ok(OutputLayout::PerContig),
            "merged" | "single" => Ok(OutputLayout::Merged),
            other => Err(format!("unknown layout '{other}' (use per-contig or merged)")),
        }
    }
}

/// What happened to one isolate
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteSummary {
    pub isolate: String,
    pub candidates: usize,
    pub placed: usize,
    pub regions_written: usize,
    pub regions_dropped: usize,
    pub rows_written: usize,
}

/// Reads `<gff_dir>/<isolate>.gff` and writes `<output_dir>/<isolate>.gff`
pub struct IsolateRewriter<'a> {
    gff_dir: PathBuf,
    output_dir: PathBuf,
    library: &'a GeneLibrary,
    table: &'a AnnotationTable,
    layout: OutputLayout,
}

impl<'a> IsolateRewriter<'a> {
    pub fn new(
        gff_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        library: &'a GeneLibrary,
        table: &'a AnnotationTable,
    ) -> Self {
        IsolateRewriter {
            gff_dir: gff_dir.into(),
            output_dir: output_dir.into(),
            library,
            table,
            layout: OutputLayout::default(),
        }
    }

    pub fn with_layout(mut self, layout: OutputLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn input_path(&self, isolate: &str) -> PathBuf {
        self.gff_dir.join(format!("{isolate}.gff"))
    }

    pub fn output_path(&self, isolate: &str) -> PathBuf {
        self.output_dir.join(format!("{isolate}.gff"))
    }

    /// Rewrite one isolate, advancing `counter` by the candidates it emitted
    ///
    /// On error the counter is left untouched, so a skipped isolate consumes
    /// no locus tags.
    pub fn rewrite(&self, isolate: &str, counter: &mut LocusTagCounter) -> Result<RewriteSummary> {
        let input = self.input_path(isolate);
        let text = fs::read_to_string(&input)
            .with_context(|| format!("Failed to read annotation file: {}", input.display()))?;
        let doc = GffDocument::parse(&text)
            .map_err(|reason| anyhow!(UpdateError::malformed_annotation(isolate, reason)))?;

        let mut local = *counter;
        let (content, summary) = self.render(isolate, &doc, &mut local)?;
        write_atomically(&self.output_path(isolate), &content)?;

        *counter = local;
        Ok(summary)
    }

    /// Build the output text for an already parsed document
    pub fn render(
        &self,
        isolate: &str,
        doc: &GffDocument,
        counter: &mut LocusTagCounter,
    ) -> Result<(String, RewriteSummary)> {
        let malformed =
            |reason: String| anyhow!(UpdateError::malformed_annotation(isolate, reason));

        let from_table = self.table.has_isolate(isolate);
        let source_regions = if from_table {
            self.table.regions_for(isolate)
        } else {
            warn!("{isolate}: not in the annotation table, keeping the features of its GFF");
            doc.feature_blocks()
                .into_iter()
                .map(|(region, rows)| (region, rows.len()))
                .collect()
        };
        for (region, count) in source_regions {
            if doc.region(region).is_none() {
                warn!("{isolate}: dropping {count} feature rows on undeclared region '{region}'");
            }
        }

        let candidates = resolve_library_hits(isolate, self.library, counter);
        let mut summary = RewriteSummary {
            isolate: isolate.to_string(),
            candidates: candidates.len(),
            ..Default::default()
        };

        let mut seen_tags = HashSet::new();
        let mut sections: Vec<(&SequenceRegion, Vec<FeatureRow>)> = Vec::new();

        for region in &doc.regions {
            let sequence = doc
                .sequence(&region.name)
                .ok_or_else(|| malformed(format!("no FASTA record for region '{}'", region.name)))?;
            let contig = Contig::new(region.name.as_str(), sequence)
                .map_err(|e| malformed(format!("region '{}': {e}", region.name)))?;

            let existing = if from_table {
                self.table.rows_for(isolate, &region.name)
            } else {
                doc.features_on(&region.name)
            };

            let placed = place_candidates(&contig, &candidates);
            for row in &placed {
                if !seen_tags.insert(row.attributes.clone()) {
                    warn!(
                        "{isolate}: a refound gene was placed on more than one contig ({}:{})",
                        region.name, row.start
                    );
                }
            }
            summary.placed += placed.len();

            let rows = merge_contig(existing, placed);
            if rows.is_empty() {
                debug!("{isolate}: region '{}' has no features, dropping its header", region.name);
                summary.regions_dropped += 1;
                continue;
            }
            summary.rows_written += rows.len();
            sections.push((region, rows));
        }

        summary.regions_written = sections.len();
        if sections.is_empty() {
            warn!("{isolate}: no region kept any features");
        }

        let content = match self.layout {
            OutputLayout::PerContig => render_per_contig(&sections, &doc.fasta_text),
            OutputLayout::Merged => render_merged(&doc.directives, &sections, &doc.fasta_text),
        };
        Ok((content, summary))
    }
}

fn rows_text(rows: &[FeatureRow]) -> String {
    rows.iter().map(|r| r.to_string()).collect::<Vec<_>>().join("\n")
}

/// `<declaration>\n<rows>\n##FASTA<sequence section>` per region, each block
/// followed by a newline
fn render_per_contig(sections: &[(&SequenceRegion, Vec<FeatureRow>)], fasta_text: &str) -> String {
    let mut out = String::new();
    for (region, rows) in sections {
        out.push_str(&region.line);
        out.push('\n');
        out.push_str(&rows_text(rows));
        out.push('\n');
        out.push_str(FASTA_MARKER);
        out.push_str(fasta_text);
        out.push('\n');
    }
    out
}

fn render_merged(
    directives: &[String],
    sections: &[(&SequenceRegion, Vec<FeatureRow>)],
    fasta_text: &str,
) -> String {
    let mut out = String::new();
    if !directives.iter().any(|d| d.starts_with("##gff-version")) {
        out.push_str("##gff-version 3\n");
    }
    for directive in directives {
        out.push_str(directive);
        out.push('\n');
    }
    for (region, _) in sections {
        out.push_str(&region.line);
        out.push('\n');
    }
    for (_, rows) in sections {
        out.push_str(&rows_text(rows));
        out.push('\n');
    }
    out.push_str(FASTA_MARKER);
    if !fasta_text.starts_with('\n') {
        out.push('\n');
    }
    out.push_str(fasta_text);
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// Temp file for a new output: `rw-r--r--` before the process umask
#[cfg(unix)]
fn output_temp_file(dir: &Path) -> std::io::Result<NamedTempFile> {
    use std::os::unix::fs::PermissionsExt;
    tempfile::Builder::new()
        .permissions(fs::Permissions::from_mode(0o644))
        .tempfile_in(dir)
}

#[cfg(not(unix))]
fn output_temp_file(dir: &Path) -> std::io::Result<NamedTempFile> {
    NamedTempFile::new_in(dir)
}

/// Write through a temporary file in the destination directory so an input
/// file being overwritten in place is never left half written
///
/// An existing destination keeps its permissions.
pub fn write_atomically(path: &Path, content: &str) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = output_temp_file(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    temp.write_all(content.as_bytes())?;
    if let Ok(metadata) = fs::metadata(path) {
        temp.as_file()
            .set_permissions(metadata.permissions())
            .with_context(|| format!("Failed to copy permissions of {}", path.display()))?;
    }
    temp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
