//! Reader for the Panaroo pangenome graph (`final_graph.gml`)
//!
//! Only the GML subset written by networkx is understood: `key value` pairs
//! where a value is an integer, a real, a double-quoted string or a bracketed
//! list of further pairs. Repeated keys form lists. Nodes are projected onto a
//! fixed record since only four attributes are ever consumed.

use anyhow::{anyhow, Context, Result};
use nom::{
    branch::alt,
    bytes::complete::{take_till, take_while1},
    character::complete::{char, multispace1, not_line_ending},
    combinator::{all_consuming, map, map_res, value},
    multi::many0,
    number::complete::recognize_float,
    sequence::{delimited, pair, preceded, terminated},
    IResult,
};
use std::fs;
use std::path::Path;

use crate::error::UpdateError;

/// File name Panaroo gives the final graph inside its output directory
pub const GRAPH_FILE_NAME: &str = "final_graph.gml";

/// A parsed GML value
#[derive(Debug, Clone, PartialEq)]
pub enum GmlValue {
    Int(i64),
    Real(f64),
    Str(String),
    List(Vec<(String, GmlValue)>),
}

impl GmlValue {
    /// Scalar rendered as text; `None` for nested lists
    pub fn as_text(&self) -> Option<String> {
        match self {
            GmlValue::Int(i) => Some(i.to_string()),
            GmlValue::Real(r) => Some(r.to_string()),
            GmlValue::Str(s) => Some(s.clone()),
            GmlValue::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[(String, GmlValue)]> {
        match self {
            GmlValue::List(entries) => Some(entries),
            _ => None,
        }
    }
}

/// Skip whitespace and `#` comments
fn sp(input: &str) -> IResult<&str, ()> {
    value(
        (),
        many0(alt((
            value((), multispace1),
            value((), pair(char('#'), not_line_ending)),
        ))),
    )(input)
}

fn key(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

fn string(input: &str) -> IResult<&str, GmlValue> {
    map(
        delimited(char('"'), take_till(|c| c == '"'), char('"')),
        |s: &str| GmlValue::Str(unescape(s)),
    )(input)
}

fn number(input: &str) -> IResult<&str, GmlValue> {
    map_res(recognize_float, |s: &str| {
        if s.contains(['.', 'e', 'E']) {
            s.parse::<f64>().map(GmlValue::Real)
        } else {
            match s.parse::<i64>() {
                Ok(i) => Ok(GmlValue::Int(i)),
                // Out of i64 range
                Err(_) => s.parse::<f64>().map(GmlValue::Real),
            }
        }
    })(input)
}

fn list(input: &str) -> IResult<&str, GmlValue> {
    map(
        delimited(char('['), many0(entry), preceded(sp, char(']'))),
        GmlValue::List,
    )(input)
}

fn gml_value(input: &str) -> IResult<&str, GmlValue> {
    alt((list, string, number))(input)
}

fn entry(input: &str) -> IResult<&str, (String, GmlValue)> {
    let (input, k) = preceded(sp, key)(input)?;
    let (input, v) = preceded(sp, gml_value)(input)?;
    Ok((input, (k.to_string(), v)))
}

/// Parse a whole GML document into its top-level pairs
pub fn parse_document(text: &str) -> Result<Vec<(String, GmlValue)>> {
    match all_consuming(terminated(many0(entry), sp))(text) {
        Ok((_, entries)) => Ok(entries),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let offset = text.len() - e.input.len();
            let line = text[..offset].matches('\n').count() + 1;
            Err(anyhow!("GML syntax error at line {line} ({:?})", e.code))
        }
        Err(nom::Err::Incomplete(_)) => Err(anyhow!("truncated GML document")),
    }
}

/// Decode the HTML character references networkx writes into GML strings
fn unescape(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];

        let decoded = rest.find(';').and_then(|semi| {
            let entity = &rest[1..semi];
            let ch = match entity {
                "amp" => Some('&'),
                "quot" => Some('"'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "apos" => Some('\''),
                _ if entity.starts_with("#x") || entity.starts_with("#X") => {
                    u32::from_str_radix(&entity[2..], 16).ok().and_then(char::from_u32)
                }
                _ if entity.starts_with('#') => {
                    entity[1..].parse::<u32>().ok().and_then(char::from_u32)
                }
                _ => None,
            };
            ch.map(|c| (c, semi + 1))
        });

        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &rest[consumed..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// All scalar values stored under `name` (repeated keys yield several)
fn texts(entries: &[(String, GmlValue)], name: &str) -> Vec<String> {
    entries
        .iter()
        .filter(|(k, _)| k == name)
        .filter_map(|(_, v)| v.as_text())
        .collect()
}

/// The node attributes the update consumes
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub id: i64,
    /// Member gene identifiers, split on `;`
    pub gene_ids: Vec<String>,
    pub name: String,
    pub description: String,
    /// Sequence identifiers of the form `<isolate index>_<...>`
    pub seq_ids: Vec<String>,
}

impl GraphNode {
    /// True when a member gene was refound from raw sequence by Panaroo
    pub fn is_refound(&self) -> bool {
        self.gene_ids.iter().any(|id| id.contains("refound"))
    }

    fn from_entries(entries: &[(String, GmlValue)]) -> std::result::Result<Self, String> {
        let id = entries
            .iter()
            .find(|(k, _)| k == "id")
            .and_then(|(_, v)| match v {
                GmlValue::Int(i) => Some(*i),
                _ => None,
            })
            .ok_or_else(|| "node without integer id".to_string())?;

        let name = texts(entries, "name").join(";");
        if name.is_empty() {
            return Err(format!("node {id} has no name"));
        }

        let gene_ids = texts(entries, "geneIDs")
            .iter()
            .flat_map(|s| s.split(';'))
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Ok(GraphNode {
            id,
            gene_ids,
            name,
            description: texts(entries, "description").join(";"),
            seq_ids: texts(entries, "seqIDs"),
        })
    }
}

/// Nodes and isolate names of a Panaroo graph
#[derive(Debug, Clone, Default)]
pub struct PangenomeGraph {
    pub isolates: Vec<String>,
    pub nodes: Vec<GraphNode>,
}

impl PangenomeGraph {
    /// Read `final_graph.gml` from a Panaroo output directory
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        Self::from_path(dir.as_ref().join(GRAPH_FILE_NAME))
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read graph: {}", path.display()))?;
        Self::parse(&text).map_err(|e| {
            anyhow!(UpdateError::MalformedGraph {
                path: path.to_path_buf(),
                reason: format!("{e:#}"),
            })
        })
    }

    pub fn parse(text: &str) -> Result<Self> {
        let document = parse_document(text)?;
        let graph = document
            .iter()
            .find(|(k, _)| k == "graph")
            .and_then(|(_, v)| v.as_list())
            .ok_or_else(|| anyhow!("no top-level graph block"))?;

        let isolates = texts(graph, "isolateNames");
        let nodes = graph
            .iter()
            .filter(|(k, _)| k == "node")
            .filter_map(|(_, v)| v.as_list())
            .map(GraphNode::from_entries)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|reason| anyhow!(reason))?;

        Ok(PangenomeGraph { isolates, nodes })
    }

    pub fn refound_nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter().filter(|node| node.is_refound())
    }
}
