/// In-memory index of refound genes and where each isolate carries them
///
/// Built once per run from the graph and the alignment directory; read-only
/// while isolates are rewritten.
use anyhow::Result;
use indexmap::IndexMap;
use log::{debug, warn};
use rayon::prelude::*;
use std::path::Path;

use crate::alignment::read_gene_alignment;
use crate::gml::PangenomeGraph;

/// Product assigned to genes whose graph node has no description
pub const DEFAULT_DESCRIPTION: &str = "hypothetical protein";

/// One copy of a gene in one isolate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    pub isolate: String,
    pub cluster: String,
    /// Gap-free, upper-case nucleotide sequence
    pub sequence: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gene {
    pub name: String,
    pub description: String,
    pub occurrences: Vec<Occurrence>,
}

impl Gene {
    pub fn new(name: impl Into<String>, description: &str, occurrences: Vec<Occurrence>) -> Self {
        let description = if description.is_empty() {
            DEFAULT_DESCRIPTION.to_string()
        } else {
            description.to_string()
        };
        Gene {
            name: name.into(),
            description,
            occurrences,
        }
    }
}

/// Gene name -> gene, in graph node order
#[derive(Debug, Clone, Default)]
pub struct GeneLibrary {
    genes: IndexMap<String, Gene>,
}

impl GeneLibrary {
    /// Load every refound gene of `graph` from `alignment_dir`
    ///
    /// Alignment files are read in parallel. A gene without either alignment
    /// file aborts the build.
    pub fn build(graph: &PangenomeGraph, alignment_dir: &Path) -> Result<Self> {
        let refound: Vec<_> = graph.refound_nodes().collect();
        debug!("{} refound genes in graph", refound.len());

        let genes = refound
            .par_iter()
            .map(|node| -> Result<Gene> {
                let occurrences = read_gene_alignment(alignment_dir, &node.name)?
                    .into_iter()
                    .map(|record| Occurrence {
                        isolate: record.isolate,
                        cluster: record.cluster,
                        sequence: record.sequence,
                    })
                    .collect();
                Ok(Gene::new(node.name.clone(), &node.description, occurrences))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::from_genes(genes))
    }

    /// A later gene with an already-seen name replaces the earlier one in place
    pub fn from_genes(genes: impl IntoIterator<Item = Gene>) -> Self {
        let mut map = IndexMap::new();
        for gene in genes {
            if map.insert(gene.name.clone(), gene).is_some() {
                debug!("duplicate refound gene name in graph; keeping the last record");
            }
        }
        GeneLibrary { genes: map }
    }

    pub fn get(&self, name: &str) -> Option<&Gene> {
        self.genes.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Gene> {
        self.genes.values()
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    pub fn total_occurrences(&self) -> usize {
        self.genes.values().map(|g| g.occurrences.len()).sum()
    }

    /// Every (gene, occurrence) carried by `isolate`, in library order
    ///
    /// Several occurrences of one gene in the same isolate are all returned;
    /// they are reported as a data-quality warning.
    pub fn hits_for<'a>(&'a self, isolate: &str) -> Vec<(&'a Gene, &'a Occurrence)> {
        let mut hits = Vec::new();
        for gene in self.genes.values() {
            let before = hits.len();
            hits.extend(
                gene.occurrences
                    .iter()
                    .filter(|occ| occ.isolate == isolate)
                    .map(|occ| (gene, occ)),
            );
            let copies = hits.len() - before;
            if copies > 1 {
                warn!(
                    "gene '{}' has {} occurrences in isolate '{}'; each is placed separately",
                    gene.name, copies, isolate
                );
            }
        }
        hits
    }
}
