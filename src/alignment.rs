/// Per-gene alignment files written by Panaroo
///
/// Each refound gene has `<gene>.aln.fas` (aligned) or, failing that,
/// `<gene>.fasta` (unaligned). Both are read the same way.
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::UpdateError;

pub const ALIGNED_SUFFIX: &str = ".aln.fas";
pub const UNALIGNED_SUFFIX: &str = ".fasta";

/// One `>isolate;cluster` record with its gap-free sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentRecord {
    pub isolate: String,
    pub cluster: String,
    pub sequence: String,
}

/// Parse alignment text into records
///
/// Gap characters are removed from the whole body before splitting, so
/// sequences come out as raw contig text. Anything before the first `>` is
/// ignored.
pub fn parse_alignment(text: &str) -> std::result::Result<Vec<AlignmentRecord>, String> {
    let body = text.replace('-', "");

    body.split('>')
        .skip(1)
        .map(|chunk| {
            let (header, sequence_lines) = chunk.split_once('\n').unwrap_or((chunk, ""));
            let header = header.trim_end_matches('\r');
            // Fields after the cluster are ignored
            let mut fields = header.split(';');
            let isolate = fields.next().unwrap_or_default();
            let cluster = fields.next().ok_or_else(|| {
                format!("header '{header}' is not of the form <isolate>;<cluster>")
            })?;

            let sequence: String = sequence_lines
                .lines()
                .map(|line| line.trim_end_matches('\r'))
                .collect::<String>()
                .to_ascii_uppercase();

            Ok(AlignmentRecord {
                isolate: isolate.to_string(),
                cluster: cluster.to_string(),
                sequence,
            })
        })
        .collect()
}

/// Candidate file paths for a gene, preferred first
pub fn alignment_paths(dir: &Path, gene: &str) -> (PathBuf, PathBuf) {
    (
        dir.join(format!("{gene}{ALIGNED_SUFFIX}")),
        dir.join(format!("{gene}{UNALIGNED_SUFFIX}")),
    )
}

/// Read the alignment for `gene`, falling back to the unaligned FASTA
///
/// Fails with [`UpdateError::MissingInputFile`] when neither file exists.
pub fn read_gene_alignment(dir: &Path, gene: &str) -> Result<Vec<AlignmentRecord>> {
    let (primary, fallback) = alignment_paths(dir, gene);

    let (path, text) = match fs::read_to_string(&primary) {
        Ok(text) => (primary, text),
        Err(e) if e.kind() == ErrorKind::NotFound => match fs::read_to_string(&fallback) {
            Ok(text) => (fallback, text),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(anyhow!(UpdateError::MissingInputFile {
                    gene: gene.to_string(),
                    primary,
                    fallback,
                }));
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read alignment: {}", fallback.display()))
            }
        },
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to read alignment: {}", primary.display()))
        }
    };

    parse_alignment(&text)
        .map_err(|reason| anyhow!(UpdateError::MalformedAlignment { path, reason }))
}
