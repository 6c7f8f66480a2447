/// Error kinds surfaced by the update pipeline
///
/// Everything is propagated as `anyhow::Error`; these variants sit at the root
/// of the chain so callers (and tests) can `downcast_ref` on them.
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpdateError {
    /// Neither `<gene>.aln.fas` nor `<gene>.fasta` exists for a refound gene
    #[error(
        "no alignment file for gene '{gene}' (tried {} and {})",
        .primary.display(),
        .fallback.display()
    )]
    MissingInputFile {
        gene: String,
        primary: PathBuf,
        fallback: PathBuf,
    },

    #[error("malformed alignment file {}: {reason}", .path.display())]
    MalformedAlignment { path: PathBuf, reason: String },

    #[error("malformed annotation file for isolate '{isolate}': {reason}")]
    MalformedAnnotation { isolate: String, reason: String },

    #[error("malformed annotation table {}: {reason}", .path.display())]
    MalformedTable { path: PathBuf, reason: String },

    #[error("malformed graph {}: {reason}", .path.display())]
    MalformedGraph { path: PathBuf, reason: String },

    #[error("output directory {} is not writable: {reason}", .path.display())]
    OutputDirectoryUnwritable { path: PathBuf, reason: String },
}

impl UpdateError {
    pub fn malformed_annotation(isolate: &str, reason: impl Into<String>) -> Self {
        UpdateError::MalformedAnnotation {
            isolate: isolate.to_string(),
            reason: reason.into(),
        }
    }
}
