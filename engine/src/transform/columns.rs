//! Column operations.
//!
//! [`apply`] runs a list of [`ColumnOperation`]s in order. Each operation
//! is checked against the columns as they stand at that point, before any
//! row is touched; the first failure aborts the whole call and the input is
//! never modified.
//!
//! [`validate_operations`] is the dry-run counterpart: every operation is
//! checked against the *original* columns and all problems are reported.
//!
//! # JSON form
//!
//! ```json
//! [
//!   {"type": "add", "name": "status", "default": "active"},
//!   {"type": "add", "name": "fullName", "default": {"template": "{first} {last}"}},
//!   {"type": "rename", "name": "mail", "newName": "email"},
//!   {"type": "split", "column": "name", "delimiter": " ", "into": ["first", "last"]},
//!   {"type": "transform", "column": "email", "operations": [{"type": "lowercase"}]}
//! ]
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::{self, Deserializer};
use serde::ser::{self, SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use super::values::{apply_all, ValueOperation};
use crate::error::{TransformError, TransformResult};
use crate::models::{CellValue, RecordSet, Row};
use crate::validation::ValidationReport;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([^{}]+)\}").expect("valid regex"));

// =============================================================================
// Defaults for added columns
// =============================================================================

/// Per-row derivation. An `Err` degrades to null for that row.
pub type RowFn = Arc<dyn Fn(&Row) -> Result<CellValue, String> + Send + Sync>;

/// Value of a newly added column.
///
/// In JSON: `{"copy": "col"}` and `{"template": "{a}-{b}"}` are
/// derivations, `{"value": x}` is an explicit constant and anything else
/// is taken as the constant itself.
#[derive(Clone)]
pub enum ColumnDefault {
    Value(CellValue),
    Copy(String),
    Template(String),
    Computed(RowFn),
}

impl ColumnDefault {
    /// Derivation from an in-process closure.
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&Row) -> Result<CellValue, String> + Send + Sync + 'static,
    {
        ColumnDefault::Computed(Arc::new(f))
    }

    fn value_for(&self, row: &Row) -> CellValue {
        let derived = match self {
            ColumnDefault::Value(v) => Ok(v.clone()),
            ColumnDefault::Copy(source) => row
                .get(source)
                .cloned()
                .ok_or_else(|| format!("no '{}' in row", source)),
            ColumnDefault::Template(template) => render_template(template, row),
            ColumnDefault::Computed(f) => f(row),
        };
        derived.unwrap_or(CellValue::Null)
    }

    /// Columns a derivation reads from.
    fn sources(&self) -> Vec<String> {
        match self {
            ColumnDefault::Copy(source) => vec![source.clone()],
            ColumnDefault::Template(template) => PLACEHOLDER
                .captures_iter(template)
                .map(|c| c[1].to_string())
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn render_template(template: &str, row: &Row) -> Result<CellValue, String> {
    let mut missing = None;
    let text = PLACEHOLDER.replace_all(template, |caps: &regex::Captures| match row.get(&caps[1]) {
        Some(v) => v.to_text().unwrap_or_default(),
        None => {
            missing = Some(caps[1].to_string());
            String::new()
        }
    });
    match missing {
        Some(col) => Err(format!("no '{}' in row", col)),
        None => Ok(CellValue::String(text.into_owned())),
    }
}

impl Default for ColumnDefault {
    fn default() -> Self {
        ColumnDefault::Value(CellValue::Null)
    }
}

impl fmt::Debug for ColumnDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnDefault::Value(v) => f.debug_tuple("Value").field(v).finish(),
            ColumnDefault::Copy(c) => f.debug_tuple("Copy").field(c).finish(),
            ColumnDefault::Template(t) => f.debug_tuple("Template").field(t).finish(),
            ColumnDefault::Computed(_) => f.write_str("Computed(<fn>)"),
        }
    }
}

impl PartialEq for ColumnDefault {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ColumnDefault::Value(a), ColumnDefault::Value(b)) => a == b,
            (ColumnDefault::Copy(a), ColumnDefault::Copy(b)) => a == b,
            (ColumnDefault::Template(a), ColumnDefault::Template(b)) => a == b,
            (ColumnDefault::Computed(a), ColumnDefault::Computed(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl<'de> Deserialize<'de> for ColumnDefault {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if let Value::Object(obj) = &value {
            if obj.len() == 1 {
                let (key, inner) = obj.iter().next().ok_or_else(|| de::Error::custom("empty object"))?;
                match (key.as_str(), inner) {
                    ("value", v) => return Ok(ColumnDefault::Value(CellValue::from(v.clone()))),
                    ("copy", Value::String(s)) => return Ok(ColumnDefault::Copy(s.clone())),
                    ("template", Value::String(s)) => return Ok(ColumnDefault::Template(s.clone())),
                    ("copy" | "template", _) => {
                        return Err(de::Error::custom(format!("\"{}\" expects a string", key)))
                    }
                    _ => {}
                }
            }
        }
        Ok(ColumnDefault::Value(CellValue::from(value)))
    }
}

impl Serialize for ColumnDefault {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            ColumnDefault::Value(v) => map.serialize_entry("value", v)?,
            ColumnDefault::Copy(c) => map.serialize_entry("copy", c)?,
            ColumnDefault::Template(t) => map.serialize_entry("template", t)?,
            ColumnDefault::Computed(_) => {
                return Err(ser::Error::custom("computed defaults cannot be serialized"))
            }
        }
        map.end()
    }
}

impl From<CellValue> for ColumnDefault {
    fn from(value: CellValue) -> Self {
        ColumnDefault::Value(value)
    }
}

// =============================================================================
// Operations
// =============================================================================

fn default_separator() -> String {
    " ".to_string()
}

/// One structural change to the columns of a record set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ColumnOperation {
    /// New column on every row. Fails if it exists.
    Add {
        name: String,
        #[serde(default)]
        default: ColumnDefault,
    },
    /// Drop a column. Missing columns are ignored.
    Remove { name: String },
    /// Fails if `name` is missing or `new_name` is taken.
    Rename { name: String, new_name: String },
    /// Keep only these columns, in this order.
    Select { columns: Vec<String> },
    /// Put these columns first; the rest follow in their current order.
    Reorder { columns: Vec<String> },
    /// Run value operations over one column.
    Transform {
        column: String,
        operations: Vec<ValueOperation>,
    },
    /// Fan a column out into several. Missing parts become null, extra
    /// parts stay joined in the last target.
    Split {
        column: String,
        delimiter: String,
        into: Vec<String>,
        #[serde(default)]
        remove_source: bool,
    },
    /// Join the non-empty values of several columns; null when all are empty.
    Merge {
        columns: Vec<String>,
        into: String,
        #[serde(default = "default_separator")]
        separator: String,
        #[serde(default)]
        remove_sources: bool,
    },
}

enum Issue {
    Error(TransformError),
    Warning(String),
}

fn missing(columns: &[String], name: &str) -> Option<Issue> {
    (!columns.iter().any(|c| c == name))
        .then(|| Issue::Error(TransformError::ColumnNotFound(name.to_string())))
}

fn taken(columns: &[String], name: &str) -> Option<Issue> {
    columns
        .iter()
        .any(|c| c == name)
        .then(|| Issue::Error(TransformError::ColumnExists(name.to_string())))
}

fn invalid(message: impl Into<String>) -> Issue {
    Issue::Error(TransformError::InvalidOperation(message.into()))
}

fn duplicates(names: &[String]) -> Option<String> {
    let mut seen = HashSet::new();
    names.iter().find(|n| !seen.insert(n.as_str())).cloned()
}

impl ColumnOperation {
    /// Short label for logs.
    pub fn describe(&self) -> String {
        match self {
            ColumnOperation::Add { name, .. } => format!("add '{}'", name),
            ColumnOperation::Remove { name } => format!("remove '{}'", name),
            ColumnOperation::Rename { name, new_name } => format!("rename '{}' to '{}'", name, new_name),
            ColumnOperation::Select { columns } => format!("select {} columns", columns.len()),
            ColumnOperation::Reorder { columns } => format!("reorder {} columns", columns.len()),
            ColumnOperation::Transform { column, operations } => {
                let names: Vec<&str> = operations.iter().map(ValueOperation::name).collect();
                format!("transform '{}' ({})", column, names.join(", "))
            }
            ColumnOperation::Split { column, into, .. } => {
                format!("split '{}' into {}", column, into.join(", "))
            }
            ColumnOperation::Merge { columns, into, .. } => {
                format!("merge {} into '{}'", columns.join(", "), into)
            }
        }
    }

    /// Problems this operation has against `columns`.
    fn issues(&self, columns: &[String]) -> Vec<Issue> {
        let mut issues = Vec::new();
        match self {
            ColumnOperation::Add { name, default } => {
                if name.is_empty() {
                    issues.push(invalid("column name cannot be empty"));
                }
                issues.extend(taken(columns, name));
                for source in default.sources() {
                    if missing(columns, &source).is_some() {
                        issues.push(Issue::Warning(format!(
                            "'{}' derives from '{}', which does not exist; values will be null",
                            name, source
                        )));
                    }
                }
            }
            ColumnOperation::Remove { name } => {
                if missing(columns, name).is_some() {
                    issues.push(Issue::Warning(format!("'{}' does not exist; remove does nothing", name)));
                }
            }
            ColumnOperation::Rename { name, new_name } => {
                issues.extend(missing(columns, name));
                if new_name.is_empty() {
                    issues.push(invalid("column name cannot be empty"));
                }
                issues.extend(taken(columns, new_name));
            }
            ColumnOperation::Select { columns: wanted } | ColumnOperation::Reorder { columns: wanted } => {
                if wanted.is_empty() {
                    issues.push(invalid("column list cannot be empty"));
                }
                if let Some(dup) = duplicates(wanted) {
                    issues.push(invalid(format!("'{}' is listed twice", dup)));
                }
                issues.extend(wanted.iter().filter_map(|w| missing(columns, w)));
            }
            ColumnOperation::Transform { column, operations } => {
                issues.extend(missing(columns, column));
                issues.extend(operations.iter().filter_map(|op| op.check().err().map(Issue::Error)));
            }
            ColumnOperation::Split {
                column,
                delimiter,
                into,
                ..
            } => {
                issues.extend(missing(columns, column));
                if delimiter.is_empty() {
                    issues.push(invalid("split delimiter cannot be empty"));
                }
                if into.is_empty() {
                    issues.push(invalid("split needs at least one target column"));
                }
                if let Some(dup) = duplicates(into) {
                    issues.push(invalid(format!("'{}' is listed twice", dup)));
                }
                issues.extend(into.iter().filter_map(|t| taken(columns, t)));
            }
            ColumnOperation::Merge { columns: sources, into, .. } => {
                if sources.is_empty() {
                    issues.push(invalid("merge needs at least one source column"));
                }
                issues.extend(sources.iter().filter_map(|s| missing(columns, s)));
                issues.extend(taken(columns, into));
            }
        }
        issues
    }

    /// First blocking problem, if any.
    fn preflight(&self, columns: &[String]) -> TransformResult<()> {
        match self.issues(columns).into_iter().find_map(|i| match i {
            Issue::Error(e) => Some(e),
            Issue::Warning(_) => None,
        }) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

// =============================================================================
// Application
// =============================================================================

/// Rebuild a row, replacing the entry for `anchor` with `entries`.
/// Rows without `anchor` get `entries` appended.
fn splice(row: &Row, anchor: &str, keep_anchor: bool, entries: Vec<(String, CellValue)>) -> Row {
    if !row.contains_key(anchor) {
        let mut out = row.clone();
        out.extend(entries);
        return out;
    }
    let mut out = Row::with_capacity(row.len() + entries.len());
    let mut entries = Some(entries);
    for (k, v) in row {
        if k == anchor {
            if keep_anchor {
                out.insert(k.clone(), v.clone());
            }
            if let Some(new) = entries.take() {
                out.extend(new);
            }
        } else {
            out.insert(k.clone(), v.clone());
        }
    }
    out
}

/// Same as [`splice`] for the column list.
fn splice_columns(columns: &[String], anchor: &str, keep_anchor: bool, names: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(columns.len() + names.len());
    let mut placed = false;
    for c in columns {
        if c == anchor && !placed {
            if keep_anchor {
                out.push(c.clone());
            }
            out.extend(names.iter().cloned());
            placed = true;
        } else {
            out.push(c.clone());
        }
    }
    if !placed {
        out.extend(names.iter().cloned());
    }
    out
}

fn split_value(value: Option<&CellValue>, delimiter: &str, targets: usize) -> Vec<CellValue> {
    let Some(text) = value.and_then(CellValue::to_text) else {
        return vec![CellValue::Null; targets];
    };
    let mut parts = text.splitn(targets, delimiter).map(|p| CellValue::String(p.trim().to_string()));
    (0..targets).map(|_| parts.next().unwrap_or(CellValue::Null)).collect()
}

fn merge_value(row: &Row, sources: &[String], separator: &str) -> CellValue {
    let pieces: Vec<String> = sources
        .iter()
        .filter_map(|s| row.get(s))
        .filter(|v| !v.is_blank())
        .filter_map(CellValue::to_text)
        .collect();
    if pieces.is_empty() {
        CellValue::Null
    } else {
        CellValue::String(pieces.join(separator))
    }
}

/// Apply one operation to an owned working copy.
fn apply_one(mut set: RecordSet, op: &ColumnOperation) -> TransformResult<RecordSet> {
    let columns = set.columns();
    op.preflight(&columns)?;

    let new_columns = match op {
        ColumnOperation::Add { name, default } => {
            for row in &mut set.rows {
                let value = default.value_for(row);
                row.insert(name.clone(), value);
            }
            let mut cols = columns;
            cols.push(name.clone());
            cols
        }
        ColumnOperation::Remove { name } => {
            for row in &mut set.rows {
                row.shift_remove(name);
            }
            columns.into_iter().filter(|c| c != name).collect()
        }
        ColumnOperation::Rename { name, new_name } => {
            for row in &mut set.rows {
                if let Some(value) = row.get(name).cloned() {
                    *row = splice(row, name, false, vec![(new_name.clone(), value)]);
                }
            }
            columns
                .into_iter()
                .map(|c| if &c == name { new_name.clone() } else { c })
                .collect()
        }
        ColumnOperation::Select { columns: wanted } => {
            for row in &mut set.rows {
                *row = wanted
                    .iter()
                    .filter_map(|c| row.get(c).map(|v| (c.clone(), v.clone())))
                    .collect();
            }
            wanted.clone()
        }
        ColumnOperation::Reorder { columns: wanted } => {
            let order: Vec<String> = wanted
                .iter()
                .cloned()
                .chain(columns.into_iter().filter(|c| !wanted.contains(c)))
                .collect();
            for row in &mut set.rows {
                let mut sorted: Row = order
                    .iter()
                    .filter_map(|c| row.get(c).map(|v| (c.clone(), v.clone())))
                    .collect();
                // keys outside the column list keep their relative order at the end
                for (k, v) in row.iter() {
                    if !sorted.contains_key(k) {
                        sorted.insert(k.clone(), v.clone());
                    }
                }
                *row = sorted;
            }
            order
        }
        ColumnOperation::Transform { column, operations } => {
            for row in &mut set.rows {
                if let Some(cell) = row.get_mut(column) {
                    *cell = apply_all(operations, cell);
                }
            }
            columns
        }
        ColumnOperation::Split {
            column,
            delimiter,
            into,
            remove_source,
        } => {
            for row in &mut set.rows {
                let parts = split_value(row.get(column), delimiter, into.len());
                let entries = into.iter().cloned().zip(parts).collect();
                *row = splice(row, column, !remove_source, entries);
            }
            splice_columns(&columns, column, !remove_source, into)
        }
        ColumnOperation::Merge {
            columns: sources,
            into,
            separator,
            remove_sources,
        } => {
            let anchor = &sources[0];
            for row in &mut set.rows {
                let merged = merge_value(row, sources, separator);
                let mut out = splice(row, anchor, true, vec![(into.clone(), merged)]);
                if *remove_sources {
                    for s in sources {
                        out.shift_remove(s);
                    }
                }
                *row = out;
            }
            let cols = splice_columns(&columns, anchor, true, std::slice::from_ref(into));
            if *remove_sources {
                cols.into_iter().filter(|c| !sources.contains(c)).collect()
            } else {
                cols
            }
        }
    };

    if set.headers.is_some() {
        set.headers = Some(new_columns);
    }
    set.refresh_counts();
    Ok(set)
}

/// Apply `operations` in order. All or nothing: on error, no partial
/// result is returned and `set` is untouched.
pub fn apply(set: &RecordSet, operations: &[ColumnOperation]) -> TransformResult<RecordSet> {
    operations
        .iter()
        .try_fold(set.clone(), |current, op| apply_one(current, op))
}

/// Check every operation against the original columns of `set`, without
/// applying anything, and report every problem found.
pub fn validate_operations(set: &RecordSet, operations: &[ColumnOperation]) -> ValidationReport {
    let columns = set.columns();
    let mut report = ValidationReport::new();
    for (i, op) in operations.iter().enumerate() {
        for issue in op.issues(&columns) {
            match issue {
                Issue::Error(e) => report.error(format!("Operation {} ({}): {}", i + 1, op.describe(), e)),
                Issue::Warning(w) => report.warning(format!("Operation {} ({}): {}", i + 1, op.describe(), w)),
            }
        }
    }
    report
}
