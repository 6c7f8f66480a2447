//! GFF3 with embedded FASTA, as produced by Prokka/Bakta and read by Panaroo
//!
//! The file is walked once through an explicit state machine (headers,
//! features, FASTA). Feature rows can later be grouped into per-region blocks
//! with [`GffDocument::feature_blocks`]. The sequence half is kept verbatim
//! since the per-contig output layout re-emits it unchanged.

use log::warn;
use std::fmt;

/// Directive declaring a contig and its length
pub const SEQUENCE_REGION: &str = "##sequence-region";
/// Directive separating annotations from sequences
pub const FASTA_MARKER: &str = "##FASTA";
/// Source column written on every output row
pub const OUTPUT_SOURCE: &str = "Panaroo";

/// One 9-column GFF feature line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureRow {
    pub region: String,
    pub source: String,
    pub feature_type: String,
    /// 1-based, inclusive
    pub start: u64,
    /// 1-based, inclusive
    pub end: u64,
    pub score: String,
    pub strand: String,
    pub phase: String,
    pub attributes: String,
}

impl FeatureRow {
    /// Parse a tab-separated feature line
    pub fn parse(line: &str) -> Result<Self, String> {
        let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split('\t').collect();
        if fields.len() < 9 {
            return Err(format!(
                "feature line has {} columns, expected 9: '{line}'",
                fields.len()
            ));
        }

        let coordinate = |idx: usize, what: &str| {
            fields[idx]
                .trim()
                .parse::<u64>()
                .map_err(|_| format!("invalid {what} '{}' in feature line", fields[idx]))
        };

        Ok(FeatureRow {
            region: fields[0].to_string(),
            source: fields[1].to_string(),
            feature_type: fields[2].to_string(),
            start: coordinate(3, "start")?,
            end: coordinate(4, "end")?,
            score: fields[5].to_string(),
            strand: fields[6].to_string(),
            phase: fields[7].to_string(),
            // Tabs inside attributes are not legal GFF, keep whatever follows
            attributes: fields[8..].join("\t"),
        })
    }
}

impl fmt::Display for FeatureRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.region,
            self.source,
            self.feature_type,
            self.start,
            self.end,
            self.score,
            self.strand,
            self.phase,
            self.attributes
        )
    }
}

/// A `##sequence-region` declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceRegion {
    pub name: String,
    /// The declaration line as written in the input
    pub line: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaRecord {
    pub name: String,
    pub sequence: String,
}

/// Parser position within the file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    ReadingHeaders,
    ReadingFeatures,
    ReadingFasta,
}

/// A parsed isolate annotation file
#[derive(Debug, Clone, Default)]
pub struct GffDocument {
    /// Directives other than region declarations (e.g. `##gff-version 3`)
    pub directives: Vec<String>,
    pub regions: Vec<SequenceRegion>,
    pub features: Vec<FeatureRow>,
    /// Everything after the `##FASTA` marker line, byte for byte
    pub fasta_text: String,
    pub sequences: Vec<FastaRecord>,
}

impl GffDocument {
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut doc = GffDocument::default();
        let mut state = ParseState::ReadingHeaders;
        let mut offset = 0;

        for (lineno, raw) in text.split_inclusive('\n').enumerate() {
            let line_start = offset;
            offset += raw.len();
            let line = raw.trim_end_matches(['\r', '\n']);
            let at = |e: String| format!("line {}: {e}", lineno + 1);

            match state {
                ParseState::ReadingFasta => break,
                _ if line.starts_with(FASTA_MARKER) => {
                    doc.fasta_text = text[line_start + FASTA_MARKER.len()..].to_string();
                    state = ParseState::ReadingFasta;
                }
                _ if line.trim().is_empty() => {}
                _ if line.starts_with(SEQUENCE_REGION) => {
                    let name = line
                        .split_whitespace()
                        .nth(1)
                        .ok_or_else(|| at("region declaration without a name".to_string()))?;
                    if doc.region(name).is_some() {
                        warn!("line {}: region '{name}' declared again, ignored", lineno + 1);
                        continue;
                    }
                    doc.regions.push(SequenceRegion {
                        name: name.to_string(),
                        line: line.to_string(),
                    });
                }
                ParseState::ReadingHeaders if line.starts_with('#') => {
                    doc.directives.push(line.to_string());
                }
                ParseState::ReadingFeatures if line.starts_with('#') => {}
                ParseState::ReadingHeaders | ParseState::ReadingFeatures => {
                    state = ParseState::ReadingFeatures;
                    doc.features.push(FeatureRow::parse(line).map_err(at)?);
                }
            }
        }

        if state != ParseState::ReadingFasta {
            return Err(format!("no {FASTA_MARKER} section"));
        }
        if doc.regions.is_empty() {
            return Err(format!("no {SEQUENCE_REGION} declarations"));
        }
        doc.sequences = parse_fasta(&doc.fasta_text);

        Ok(doc)
    }

    pub fn region(&self, name: &str) -> Option<&SequenceRegion> {
        self.regions.iter().find(|r| r.name == name)
    }

    pub fn sequence(&self, name: &str) -> Option<&str> {
        self.sequences
            .iter()
            .find(|rec| rec.name == name)
            .map(|rec| rec.sequence.as_str())
    }

    /// Feature rows grouped into runs of consecutive lines on the same region
    pub fn feature_blocks(&self) -> Vec<(&str, &[FeatureRow])> {
        let mut blocks = Vec::new();
        let mut start = 0;
        for i in 1..=self.features.len() {
            if i == self.features.len() || self.features[i].region != self.features[start].region {
                blocks.push((self.features[start].region.as_str(), &self.features[start..i]));
                start = i;
            }
        }
        blocks
    }

    /// All feature rows on `region`, in file order
    pub fn features_on(&self, region: &str) -> Vec<FeatureRow> {
        self.features
            .iter()
            .filter(|row| row.region == region)
            .cloned()
            .collect()
    }
}

/// Parse `>name description` records; sequence lines are concatenated
pub fn parse_fasta(text: &str) -> Vec<FastaRecord> {
    text.split('>')
        .skip(1)
        .map(|chunk| {
            let mut lines = chunk.lines();
            let name = lines
                .next()
                .and_then(|header| header.split_whitespace().next())
                .unwrap_or_default()
                .to_string();
            let sequence = lines.map(str::trim).collect::<String>();
            FastaRecord { name, sequence }
        })
        .collect()
}
