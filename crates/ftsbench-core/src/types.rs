//! Records that flow between the pipelines and the drivers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Primary key of a document in the target index.
///
/// Source files carry either numeric or string ids. Backends that only store
/// strings hand them back through [`DocumentId::from_backend`], which restores
/// integers when the text is a canonical integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentId {
    Int(i64),
    Str(String),
}

impl DocumentId {
    pub fn from_backend(raw: &str) -> Self {
        match raw.parse::<i64>() {
            Ok(n) if n.to_string() == raw => DocumentId::Int(n),
            _ => DocumentId::Str(raw.to_string()),
        }
    }

    /// Interprets a JSON id as returned by backends that keep the original type.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_i64().map(DocumentId::Int),
            serde_json::Value::String(s) => Some(DocumentId::from_backend(s)),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentId::Int(n) => write!(f, "{n}"),
            DocumentId::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for DocumentId {
    fn from(n: i64) -> Self {
        DocumentId::Int(n)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        DocumentId::Str(s.to_string())
    }
}

/// A movie record as read from the ingestion source.
///
/// Only the fields needed for indexing are kept; anything else on the source
/// line (genres, production metadata, ...) is dropped during deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub original_title: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
}

impl Document {
    /// Parses one ingestion line. `line_no` is 1-based and only used for the error.
    pub fn parse_line(line: &str, line_no: usize) -> Result<Self> {
        serde_json::from_str(line).map_err(|source| Error::Parse { line: line_no, source })
    }
}

/// Extracts the phrase from one query line.
///
/// Accepts a JSON string (`"Matrix"`) or an object with exactly one string
/// field (`{"q": "Matrix"}`).
pub fn parse_phrase_line(line: &str, line_no: usize) -> Result<String> {
    let value: serde_json::Value =
        serde_json::from_str(line).map_err(|source| Error::Parse { line: line_no, source })?;
    match value {
        serde_json::Value::String(phrase) => Ok(phrase),
        serde_json::Value::Object(map) if map.len() == 1 => match map.into_iter().next() {
            Some((_, serde_json::Value::String(phrase))) => Ok(phrase),
            _ => Err(not_a_phrase(line_no)),
        },
        _ => Err(not_a_phrase(line_no)),
    }
}

fn not_a_phrase(line_no: usize) -> Error {
    Error::Parse {
        line: line_no,
        source: <serde_json::Error as serde::de::Error>::custom(
            "expected a JSON string or an object with a single string field",
        ),
    }
}

/// Everything a driver returns for one phrase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub ids: Vec<DocumentId>,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self::default()
    }
}
