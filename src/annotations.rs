/// The Panaroo master annotation table (`all_annotations.csv`)
///
/// Supplies the existing feature rows of every isolate, keyed by isolate and
/// region, and the last issued `New ID` from which locus tags continue.
use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::UpdateError;
use crate::gff::FeatureRow;

/// Prefix of Panaroo-assigned identifiers and of the locus tags written here
pub const LOCUS_TAG_PREFIX: &str = "PN_";

#[derive(Debug, Deserialize)]
struct TableRecord {
    #[serde(rename = "Isolate")]
    isolate: String,
    region: String,
    #[serde(rename = "type")]
    feature_type: String,
    start: String,
    end: String,
    #[serde(default)]
    strand: String,
    #[serde(default)]
    phase: String,
    #[serde(default)]
    attributes: String,
    #[serde(rename = "New ID", default)]
    new_id: String,
}

/// Coordinates may have been written as floats (`123.0`) by the producer
fn parse_coordinate(value: &str) -> Option<u64> {
    let value = value.trim();
    value.parse::<u64>().ok().or_else(|| {
        value
            .parse::<f64>()
            .ok()
            .filter(|f| *f >= 0.0 && f.fract() == 0.0)
            .map(|f| f as u64)
    })
}

/// Numeric part of a `PN_<int>` identifier
pub fn parse_locus_number(id: &str) -> Option<u64> {
    id.trim()
        .split_once(LOCUS_TAG_PREFIX)
        .and_then(|(_, n)| n.trim().parse().ok())
}

fn or_dot(value: String) -> String {
    if value.trim().is_empty() {
        ".".to_string()
    } else {
        value
    }
}

#[derive(Debug, Clone, Default)]
pub struct AnnotationTable {
    path: PathBuf,
    /// Rows per isolate, in table order
    rows: HashMap<String, Vec<FeatureRow>>,
    last_new_id: Option<String>,
    total_rows: usize,
}

impl AnnotationTable {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open annotation table: {}", path.display()))?;
        Self::from_reader(file, path)
    }

    /// Read a table from any reader; `path` is only used in error messages
    pub fn from_reader<R: std::io::Read>(reader: R, path: &Path) -> Result<Self> {
        let malformed = |reason: String| {
            anyhow!(UpdateError::MalformedTable {
                path: path.to_path_buf(),
                reason,
            })
        };

        let mut table = AnnotationTable {
            path: path.to_path_buf(),
            ..Default::default()
        };

        let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        for (idx, result) in csv_reader.deserialize::<TableRecord>().enumerate() {
            // Header is line 1
            let line = idx + 2;
            let record = result.map_err(|e| malformed(format!("row {line}: {e}")))?;

            let start = parse_coordinate(&record.start)
                .ok_or_else(|| malformed(format!("row {line}: invalid start '{}'", record.start)))?;
            let end = parse_coordinate(&record.end)
                .ok_or_else(|| malformed(format!("row {line}: invalid end '{}'", record.end)))?;

            let row = FeatureRow {
                region: record.region,
                source: ".".to_string(),
                feature_type: record.feature_type,
                start,
                end,
                score: ".".to_string(),
                strand: or_dot(record.strand),
                phase: or_dot(record.phase),
                attributes: record.attributes,
            };

            table.rows.entry(record.isolate).or_default().push(row);
            table.last_new_id = Some(record.new_id);
            table.total_rows += 1;
        }

        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.total_rows
    }

    pub fn is_empty(&self) -> bool {
        self.total_rows == 0
    }

    pub fn has_isolate(&self, isolate: &str) -> bool {
        self.rows.get(isolate).is_some_and(|rows| !rows.is_empty())
    }

    /// Existing rows of `isolate` on `region`, in table order
    pub fn rows_for(&self, isolate: &str, region: &str) -> Vec<FeatureRow> {
        self.rows
            .get(isolate)
            .map(|rows| rows.iter().filter(|r| r.region == region).cloned().collect())
            .unwrap_or_default()
    }

    /// Regions `isolate` has rows on, in first-seen order, with their row counts
    pub fn regions_for(&self, isolate: &str) -> Vec<(&str, usize)> {
        let mut regions: IndexMap<&str, usize> = IndexMap::new();
        for row in self.rows.get(isolate).into_iter().flatten() {
            *regions.entry(row.region.as_str()).or_default() += 1;
        }
        regions.into_iter().collect()
    }

    /// Number in the `New ID` column of the last row: the most recent tag issued
    pub fn last_locus_number(&self) -> Result<u64> {
        let last = self.last_new_id.as_deref().ok_or_else(|| {
            anyhow!(UpdateError::MalformedTable {
                path: self.path.clone(),
                reason: "table has no rows to seed locus tags from".to_string(),
            })
        })?;

        parse_locus_number(last).ok_or_else(|| {
            anyhow!(UpdateError::MalformedTable {
                path: self.path.clone(),
                reason: format!("last New ID '{last}' is not of the form {LOCUS_TAG_PREFIX}<int>"),
            })
        })
    }
}
