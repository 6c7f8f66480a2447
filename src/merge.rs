use log::debug;

use crate::annotations::LOCUS_TAG_PREFIX;
use crate::gff::{FeatureRow, OUTPUT_SOURCE};
use crate::library::GeneLibrary;
use crate::locate::Contig;

/// Run-wide locus tag counter
///
/// Holds the number of the most recently issued tag. It is threaded through
/// every isolate of a run so tags never repeat; the value after the run is the
/// seed plus the number of candidates emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocusTagCounter {
    last: u64,
}

impl LocusTagCounter {
    /// Continue after `last_issued` (e.g. the final `New ID` of the master table)
    pub fn seeded(last_issued: u64) -> Self {
        LocusTagCounter { last: last_issued }
    }

    /// Advance and return the new tag number
    pub fn next(&mut self) -> u64 {
        self.last += 1;
        self.last
    }

    pub fn last(&self) -> u64 {
        self.last
    }
}

/// A refound gene occurrence waiting to be placed on one of its isolate's contigs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub gene: String,
    pub sequence: String,
    pub locus_tag: u64,
    pub attributes: String,
}

/// Attribute column for a newly placed refound gene
pub fn refound_attributes(cluster: &str, gene: &str, description: &str, locus_tag: u64) -> String {
    format!(
        "ID={cluster};gbkey=CDS;gene={gene};gene_biotype=protein_coding;product={description};locus_tag={LOCUS_TAG_PREFIX}{locus_tag}"
    )
}

/// One candidate per library occurrence in `isolate`, each taking a fresh tag
///
/// Tags are consumed whether or not the candidate is placed later.
pub fn resolve_library_hits(
    isolate: &str,
    library: &GeneLibrary,
    counter: &mut LocusTagCounter,
) -> Vec<Candidate> {
    library
        .hits_for(isolate)
        .into_iter()
        .map(|(gene, occurrence)| {
            let locus_tag = counter.next();
            Candidate {
                gene: gene.name.clone(),
                sequence: occurrence.sequence.clone(),
                locus_tag,
                attributes: refound_attributes(
                    &occurrence.cluster,
                    &gene.name,
                    &gene.description,
                    locus_tag,
                ),
            }
        })
        .collect()
}

/// Locate candidates on `contig`; unplaceable ones are dropped
pub fn place_candidates(contig: &Contig, candidates: &[Candidate]) -> Vec<FeatureRow> {
    candidates
        .iter()
        .filter_map(|candidate| {
            let Some(placement) = contig.locate(&candidate.sequence) else {
                debug!(
                    "{} ({} bp) not uniquely placed on {}",
                    candidate.gene,
                    candidate.sequence.len(),
                    contig.region
                );
                return None;
            };
            Some(FeatureRow {
                region: contig.region.clone(),
                source: OUTPUT_SOURCE.to_string(),
                feature_type: "CDS".to_string(),
                start: placement.start,
                end: placement.end,
                score: ".".to_string(),
                strand: placement.strand.to_string(),
                phase: "0".to_string(),
                attributes: candidate.attributes.clone(),
            })
        })
        .collect()
}

/// Merge placed rows into a contig's existing rows
///
/// Existing rows come first, the union is stably sorted by start and only the
/// first row per start survives, so an existing annotation beats a placed gene
/// at the same position. Every row is restamped with the output source and an
/// empty score.
pub fn merge_contig(existing: Vec<FeatureRow>, placed: Vec<FeatureRow>) -> Vec<FeatureRow> {
    let mut rows = existing;
    rows.extend(placed);
    rows.sort_by_key(|row| row.start);
    rows.dedup_by_key(|row| row.start);

    for row in &mut rows {
        row.source = OUTPUT_SOURCE.to_string();
        row.score = ".".to_string();
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{Gene, Occurrence};
    use pretty_assertions::assert_eq;

    fn row(start: u64, end: u64, attributes: &str) -> FeatureRow {
        FeatureRow {
            region: "ctg1".to_string(),
            source: "Prokka".to_string(),
            feature_type: "CDS".to_string(),
            start,
            end,
            score: "0.9".to_string(),
            strand: "+".to_string(),
            phase: "0".to_string(),
            attributes: attributes.to_string(),
        }
    }

    fn library() -> GeneLibrary {
        let occ = |isolate: &str, cluster: &str, sequence: &str| Occurrence {
            isolate: isolate.to_string(),
            cluster: cluster.to_string(),
            sequence: sequence.to_string(),
        };
        GeneLibrary::from_genes(vec![
            Gene::new("tetM", "", vec![occ("iso1", "c1", "AAATAG"), occ("iso2", "c2", "TTT")]),
            Gene::new("blaZ", "beta-lactamase", vec![occ("iso1", "c3", "GGGGGG")]),
        ])
    }

    #[test]
    fn test_candidates_take_consecutive_tags() {
        let mut counter = LocusTagCounter::seeded(100);
        let candidates = resolve_library_hits("iso1", &library(), &mut counter);

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].locus_tag, 101);
        assert_eq!(
            candidates[0].attributes,
            "ID=c1;gbkey=CDS;gene=tetM;gene_biotype=protein_coding;product=hypothetical protein;locus_tag=PN_101"
        );
        assert_eq!(candidates[1].locus_tag, 102);
        assert!(candidates[1].attributes.ends_with("product=beta-lactamase;locus_tag=PN_102"));
        assert_eq!(counter.last(), 102);

        let next = resolve_library_hits("iso2", &library(), &mut counter);
        assert_eq!(next[0].locus_tag, 103);
        assert!(resolve_library_hits("iso3", &library(), &mut counter).is_empty());
        assert_eq!(counter.last(), 103);
    }

    #[test]
    fn test_place_and_merge_end_to_end() {
        let contig = Contig::new("ctg1", "ATGAAATAG").unwrap();
        let mut counter = LocusTagCounter::seeded(0);
        let candidates = resolve_library_hits("iso1", &library(), &mut counter);

        // GGGGGG is absent and is dropped
        let placed = place_candidates(&contig, &candidates);
        assert_eq!(placed.len(), 1);
        assert_eq!((placed[0].start, placed[0].end), (4, 9));
        assert_eq!(placed[0].strand, "+");
        assert_eq!(placed[0].phase, "0");

        let merged = merge_contig(vec![row(1, 3, "ID=a")], placed);
        let lines: Vec<_> = merged.iter().map(|r| r.to_string()).collect();
        assert_eq!(
            lines,
            vec![
                "ctg1\tPanaroo\tCDS\t1\t3\t.\t+\t0\tID=a",
                "ctg1\tPanaroo\tCDS\t4\t9\t.\t+\t0\tID=c1;gbkey=CDS;gene=tetM;gene_biotype=protein_coding;product=hypothetical protein;locus_tag=PN_1",
            ]
        );
    }

    #[test]
    fn test_existing_row_wins_duplicate_start() {
        let existing = vec![row(50, 80, "ID=old"), row(10, 20, "ID=first")];
        let placed = vec![row(50, 99, "ID=new"), row(30, 40, "ID=placed")];

        let merged = merge_contig(existing, placed);
        let kept: Vec<_> = merged.iter().map(|r| (r.start, r.attributes.as_str())).collect();
        assert_eq!(kept, vec![(10, "ID=first"), (30, "ID=placed"), (50, "ID=old")]);
    }

    #[test]
    fn test_merge_is_idempotent_without_candidates() {
        let once = merge_contig(vec![row(7, 9, "a"), row(1, 4, "b"), row(7, 12, "c")], vec![]);
        let twice = merge_contig(once.clone(), vec![]);
        assert_eq!(once, twice);
        assert!(twice.windows(2).all(|w| w[0].start < w[1].start));
    }
}
