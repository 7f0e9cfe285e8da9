//! Canonical tabular model shared by every format and transformation.
//!
//! This module contains the core data structures used throughout the pipeline:
//!
//! - [`RecordSet`] - Ordered rows, optional header order, metadata
//! - [`CellValue`] - One cell (null, boolean, number, string, date, nested)
//! - [`Metadata`] - Originating format, encoding, sheet name, declared counts
//! - [`Format`] - Format tags known to the detector and the registry
//! - [`stats`] - Best-effort per-column statistics
//!
//! Rows need not share a shape. A key missing from a row reads as null.

pub mod stats;
pub mod value;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use stats::{column_stats, ColumnStats};
pub use value::{CellValue, Row};

// =============================================================================
// Format tags
// =============================================================================

/// On-disk formats known to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Delimited text (comma, semicolon, tab or pipe).
    Csv,
    Json,
    Xml,
    /// Markdown pipe tables.
    Markdown,
    /// Spreadsheet workbooks.
    Excel,
}

impl Format {
    pub const ALL: [Format; 5] = [
        Format::Csv,
        Format::Json,
        Format::Xml,
        Format::Markdown,
        Format::Excel,
    ];

    /// Tag used in requests and metadata.
    pub fn tag(&self) -> &'static str {
        match self {
            Format::Csv => "csv",
            Format::Json => "json",
            Format::Xml => "xml",
            Format::Markdown => "markdown",
            Format::Excel => "excel",
        }
    }

    /// Extension substituted into default output paths.
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Csv => "csv",
            Format::Json => "json",
            Format::Xml => "xml",
            Format::Markdown => "md",
            Format::Excel => "xlsx",
        }
    }

    /// Whether rows must be flat (nested values get flattened on write).
    pub fn is_flat(&self) -> bool {
        matches!(self, Format::Csv | Format::Markdown | Format::Excel)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" | "tsv" | "delimited" => Ok(Format::Csv),
            "json" => Ok(Format::Json),
            "xml" => Ok(Format::Xml),
            "markdown" | "md" => Ok(Format::Markdown),
            "excel" | "xlsx" | "xls" => Ok(Format::Excel),
            other => Err(format!("Unknown format: {}", other)),
        }
    }
}

// =============================================================================
// Metadata
// =============================================================================

/// Metadata travelling with a record set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Originating format.
    pub format: Format,
    /// Text encoding of the source.
    pub encoding: String,
    /// Sheet or section name, for formats that have them.
    #[serde(default)]
    pub sheet_name: Option<String>,
    /// Declared row count.
    pub total_rows: usize,
    /// Declared column count.
    pub total_columns: usize,
}

impl Metadata {
    pub fn new(format: Format) -> Self {
        Self {
            format,
            encoding: "utf-8".to_string(),
            sheet_name: None,
            total_rows: 0,
            total_columns: 0,
        }
    }
}

// =============================================================================
// Record Set
// =============================================================================

/// The canonical in-memory table.
///
/// Every transformation takes a `&RecordSet` and returns a fresh one, so a
/// failed stage never touches the snapshot it was given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSet {
    pub rows: Vec<Row>,
    /// Column order, when the source format defines one.
    #[serde(default)]
    pub headers: Option<Vec<String>>,
    pub metadata: Metadata,
}

impl RecordSet {
    /// Build a record set and compute its declared counts.
    pub fn new(rows: Vec<Row>, headers: Option<Vec<String>>, format: Format) -> Self {
        let mut set = Self {
            rows,
            headers,
            metadata: Metadata::new(format),
        };
        set.refresh_counts();
        set
    }

    /// Build from rows alone; the header list is left absent.
    pub fn from_rows(rows: Vec<Row>, format: Format) -> Self {
        Self::new(rows, None, format)
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.metadata.encoding = encoding.into();
        self
    }

    pub fn with_sheet_name(mut self, name: impl Into<String>) -> Self {
        self.metadata.sheet_name = Some(name.into());
        self
    }

    /// Recompute `total_rows` and `total_columns`.
    ///
    /// Column count is the header length when headers exist, otherwise the
    /// key count of the first row.
    pub fn refresh_counts(&mut self) {
        self.metadata.total_rows = self.rows.len();
        self.metadata.total_columns = match &self.headers {
            Some(h) => h.len(),
            None => self.rows.first().map(|r| r.len()).unwrap_or(0),
        };
    }

    /// Effective column list: the headers, or the union of row keys in
    /// first-seen order.
    pub fn columns(&self) -> Vec<String> {
        if let Some(headers) = &self.headers {
            return headers.clone();
        }
        let mut seen = indexmap::IndexSet::new();
        for row in &self.rows {
            for key in row.keys() {
                if !seen.contains(key.as_str()) {
                    seen.insert(key.clone());
                }
            }
        }
        seen.into_iter().collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        match &self.headers {
            Some(h) => h.iter().any(|c| c == name),
            None => self.rows.iter().any(|r| r.contains_key(name)),
        }
    }

    /// Value of `column` in row `index`, null when the key is absent.
    pub fn value(&self, index: usize, column: &str) -> &CellValue {
        static NULL: CellValue = CellValue::Null;
        self.rows
            .get(index)
            .and_then(|r| r.get(column))
            .unwrap_or(&NULL)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Headers that appear more than once, in first-duplicate order.
    pub fn duplicate_headers(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut dups = Vec::new();
        if let Some(headers) = &self.headers {
            for h in headers {
                if !seen.insert(h.as_str()) && !dups.contains(h) {
                    dups.push(h.clone());
                }
            }
        }
        dups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, CellValue)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_counts_follow_headers() {
        let rows = vec![row(&[("a", 1.into())]), row(&[("a", 2.into()), ("b", 3.into())])];
        let set = RecordSet::new(rows, Some(vec!["a".into(), "b".into(), "c".into()]), Format::Csv);
        assert_eq!(set.metadata.total_rows, 2);
        assert_eq!(set.metadata.total_columns, 3);
    }

    #[test]
    fn test_counts_without_headers_use_first_row() {
        let rows = vec![row(&[("a", 1.into())]), row(&[("a", 2.into()), ("b", 3.into())])];
        let set = RecordSet::from_rows(rows, Format::Json);
        assert_eq!(set.metadata.total_columns, 1);
        assert_eq!(set.columns(), vec!["a", "b"]);
    }

    #[test]
    fn test_absent_key_reads_as_null() {
        let set = RecordSet::from_rows(vec![row(&[("a", 1.into())])], Format::Json);
        assert!(set.value(0, "missing").is_null());
        assert!(set.value(9, "a").is_null());
    }

    #[test]
    fn test_duplicate_headers() {
        let set = RecordSet::new(
            vec![],
            Some(vec!["a".into(), "b".into(), "a".into(), "a".into()]),
            Format::Csv,
        );
        assert_eq!(set.duplicate_headers(), vec!["a"]);
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("md".parse::<Format>(), Ok(Format::Markdown));
        assert_eq!("TSV".parse::<Format>(), Ok(Format::Csv));
        assert!("yaml".parse::<Format>().is_err());
    }

    #[test]
    fn test_serialized_shape() {
        let set = RecordSet::new(vec![row(&[("a", 1.into())])], Some(vec!["a".into()]), Format::Csv);
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["metadata"]["format"], "csv");
        assert_eq!(json["metadata"]["totalRows"], 1);
        assert_eq!(json["rows"][0]["a"], 1);
    }
}
