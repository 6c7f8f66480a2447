/// Gene prevalence across isolates, written next to the updated GFFs
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;

use crate::gml::PangenomeGraph;

pub const FREQUENCY_FILE_NAME: &str = "Gene_frequencies.csv";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneFrequency {
    #[serde(rename = "Gene Name")]
    pub name: String,
    #[serde(rename = "Frequency (%)")]
    pub frequency: f64,
}

/// Isolate part of a seqID (`<isolate>_<gene index>...`)
fn isolate_of(seq_id: &str) -> &str {
    seq_id.split('_').next().unwrap_or(seq_id)
}

/// Percentage of isolates carrying each graph node, sorted by lower-cased name
///
/// The isolate count comes from the graph's `isolateNames`; graphs without it
/// fall back to the number of distinct isolates seen across all nodes.
pub fn gene_frequencies(graph: &PangenomeGraph) -> Vec<GeneFrequency> {
    let total = if graph.isolates.is_empty() {
        graph
            .nodes
            .iter()
            .flat_map(|node| node.seq_ids.iter().map(|id| isolate_of(id)))
            .collect::<HashSet<_>>()
            .len()
    } else {
        graph.isolates.len()
    };

    let mut frequencies: Vec<GeneFrequency> = graph
        .nodes
        .iter()
        .map(|node| {
            let carriers = node
                .seq_ids
                .iter()
                .map(|id| isolate_of(id))
                .collect::<HashSet<_>>()
                .len();
            let frequency = if total == 0 {
                0.0
            } else {
                carriers as f64 / total as f64 * 100.0
            };
            GeneFrequency {
                name: node.name.to_lowercase(),
                frequency,
            }
        })
        .collect();

    frequencies.sort_by(|a, b| a.name.cmp(&b.name));
    frequencies
}

pub fn write_gene_frequencies(path: &Path, frequencies: &[GeneFrequency]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for row in frequencies {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
