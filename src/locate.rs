/// Exact placement of gene sequences on assembled contigs
///
/// A gene is placed only when its sequence occurs exactly once on a strand.
/// The forward strand is consulted first; the reverse complement is only
/// searched when the forward count is not exactly one. Anything else
/// (absent, or repeated) is unplaceable and yields `None`.
use anyhow::{bail, Result};
use std::fmt;

/// Strand of a placed feature relative to the contig
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    pub fn as_char(self) -> char {
        match self {
            Strand::Forward => '+',
            Strand::Reverse => '-',
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// 1-based inclusive interval on the forward coordinates of a contig
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub start: u64,
    pub end: u64,
    pub strand: Strand,
}

impl Placement {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

/// Complement of a single base; `None` for anything outside the table
#[inline]
fn complement(base: u8) -> Option<u8> {
    match base {
        b'A' => Some(b'T'),
        b'T' => Some(b'A'),
        b'C' => Some(b'G'),
        b'G' => Some(b'C'),
        b'N' => Some(b'N'),
        b'R' => Some(b'R'),
        b'K' => Some(b'K'),
        b'Y' => Some(b'Y'),
        _ => None,
    }
}

/// Reverse complement using the fixed table {A↔T, C↔G, N, R, K, Y}
///
/// Bases outside the table are rejected rather than guessed.
pub fn reverse_complement(seq: &str) -> Result<String> {
    let bytes = seq.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());

    for (i, &base) in bytes.iter().enumerate().rev() {
        match complement(base) {
            Some(c) => out.push(c),
            None => bail!(
                "unsupported base '{}' at position {}",
                char::from(base).escape_default(),
                i + 1
            ),
        }
    }

    // Table output is pure ASCII
    Ok(String::from_utf8(out)?)
}

/// Locate `query` on a contig given both strands
///
/// Occurrences are counted left to right without overlap, so a query that
/// overlaps itself (e.g. `AA` in `AAA`) counts once.
pub fn locate(query: &str, forward: &str, reverse: &str) -> Option<Placement> {
    if query.is_empty() {
        return None;
    }

    let query = query.to_ascii_uppercase();
    let length = query.len() as u64;

    if forward.matches(query.as_str()).count() == 1 {
        let index = forward.find(query.as_str())? as u64;
        let start = index + 1;
        return Some(Placement {
            start,
            end: start + length - 1,
            strand: Strand::Forward,
        });
    }

    if reverse.matches(query.as_str()).count() == 1 {
        let index = reverse.find(query.as_str())? as u64;
        let end = reverse.len() as u64 - index;
        return Some(Placement {
            start: end - length + 1,
            end,
            strand: Strand::Reverse,
        });
    }

    None
}

/// A declared region with its forward sequence and reverse complement
#[derive(Debug, Clone)]
pub struct Contig {
    pub region: String,
    pub forward: String,
    pub reverse: String,
}

impl Contig {
    /// Build a contig, upper-casing the sequence before complementing it
    pub fn new(region: impl Into<String>, sequence: &str) -> Result<Self> {
        let forward = sequence.to_ascii_uppercase();
        let reverse = reverse_complement(&forward)?;
        Ok(Contig {
            region: region.into(),
            forward,
            reverse,
        })
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    pub fn locate(&self, query: &str) -> Option<Placement> {
        locate(query, &self.forward, &self.reverse)
    }
}
