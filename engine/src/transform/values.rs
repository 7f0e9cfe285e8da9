//! Per-cell value operations.
//!
//! Used by the `transform` column operation: each column gets an ordered
//! list of [`ValueOperation`]s, applied left to right to every cell.
//! Operations that expect text leave nested values untouched and keep null
//! as null.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::compare::coerce_date;
use crate::error::{TransformError, TransformResult};
use crate::models::CellValue;

/// A single value operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValueOperation {
    Trim,
    Uppercase,
    Lowercase,

    /// Regex replacement over the whole value.
    Replace {
        pattern: String,
        #[serde(default)]
        value: String,
    },

    PadStart {
        length: usize,
        #[serde(default = "default_pad_char")]
        char: char,
    },

    PadEnd {
        length: usize,
        #[serde(default = "default_pad_char")]
        char: char,
    },

    /// First four-digit run, as a number.
    ExtractYear,

    EnsurePrefix { value: String },
    EnsureSuffix { value: String },

    /// Lookup table; unmapped values keep their text unless `default` is set.
    Map {
        mapping: HashMap<String, String>,
        #[serde(default)]
        case_insensitive: bool,
        #[serde(default)]
        default: Option<String>,
    },

    ToBoolean {
        #[serde(default = "default_true_values")]
        true_values: Vec<String>,
    },

    /// Parse as a number; unparseable text becomes null.
    ToNumber,

    /// Parse as a date; unparseable text becomes null.
    ToDate {
        #[serde(default)]
        format: Option<String>,
    },

    /// Character-based slice.
    Substring {
        start: usize,
        #[serde(default)]
        length: Option<usize>,
    },

    Alphanumeric,
    DigitsOnly,
}

fn default_pad_char() -> char {
    '0'
}

fn default_true_values() -> Vec<String> {
    ["true", "1", "yes", "y", "on"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Text view of scalar cells. Nested values and null have none.
fn scalar_text(value: &CellValue) -> Option<String> {
    match value {
        CellValue::Null | CellValue::Map(_) | CellValue::List(_) => None,
        other => other.to_text(),
    }
}

fn pad(s: String, length: usize, fill: char, at_start: bool) -> String {
    let current = s.chars().count();
    if current >= length {
        return s;
    }
    let padding: String = std::iter::repeat_n(fill, length - current).collect();
    if at_start {
        padding + &s
    } else {
        s + &padding
    }
}

impl ValueOperation {
    /// Name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            ValueOperation::Trim => "trim",
            ValueOperation::Uppercase => "uppercase",
            ValueOperation::Lowercase => "lowercase",
            ValueOperation::Replace { .. } => "replace",
            ValueOperation::PadStart { .. } => "pad_start",
            ValueOperation::PadEnd { .. } => "pad_end",
            ValueOperation::ExtractYear => "extract_year",
            ValueOperation::EnsurePrefix { .. } => "ensure_prefix",
            ValueOperation::EnsureSuffix { .. } => "ensure_suffix",
            ValueOperation::Map { .. } => "map",
            ValueOperation::ToBoolean { .. } => "to_boolean",
            ValueOperation::ToNumber => "to_number",
            ValueOperation::ToDate { .. } => "to_date",
            ValueOperation::Substring { .. } => "substring",
            ValueOperation::Alphanumeric => "alphanumeric",
            ValueOperation::DigitsOnly => "digits_only",
        }
    }

    /// Reject parameters that can never work, before any row is touched.
    pub fn check(&self) -> TransformResult<()> {
        if let ValueOperation::Replace { pattern, .. } = self {
            Regex::new(pattern).map_err(|e| {
                TransformError::InvalidOperation(format!("replace pattern '{}': {}", pattern, e))
            })?;
        }
        Ok(())
    }

    /// Apply to one cell.
    pub fn apply(&self, value: &CellValue) -> CellValue {
        match self {
            ValueOperation::ToBoolean { true_values } => match value {
                CellValue::Bool(_) | CellValue::Null => value.clone(),
                other => match scalar_text(other) {
                    Some(s) => {
                        let s = s.trim().to_lowercase();
                        CellValue::Bool(true_values.iter().any(|t| t.to_lowercase() == s))
                    }
                    None => value.clone(),
                },
            },
            ValueOperation::ToNumber => match value {
                CellValue::Number(_) | CellValue::Null => value.clone(),
                other => scalar_text(other)
                    .and_then(|s| parse_number(&s))
                    .map(CellValue::number)
                    .unwrap_or(CellValue::Null),
            },
            ValueOperation::ToDate { format } => match (value, format) {
                (CellValue::Date(_) | CellValue::Null, _) => value.clone(),
                (other, Some(fmt)) => scalar_text(other)
                    .and_then(|s| parse_with_format(&s, fmt))
                    .map(CellValue::Date)
                    .unwrap_or(CellValue::Null),
                (other, None) => coerce_date(other).map(CellValue::Date).unwrap_or(CellValue::Null),
            },
            ValueOperation::ExtractYear => scalar_text(value)
                .and_then(|s| {
                    let digits: Vec<char> = s.chars().collect();
                    digits
                        .windows(4)
                        .find(|w| w.iter().all(char::is_ascii_digit))
                        .and_then(|w| w.iter().collect::<String>().parse::<i64>().ok())
                })
                .map(CellValue::from)
                .unwrap_or(CellValue::Null),
            _ => match scalar_text(value) {
                Some(s) => CellValue::String(self.apply_text(s)),
                None => value.clone(),
            },
        }
    }

    fn apply_text(&self, s: String) -> String {
        match self {
            ValueOperation::Trim => s.trim().to_string(),
            ValueOperation::Uppercase => s.to_uppercase(),
            ValueOperation::Lowercase => s.to_lowercase(),
            ValueOperation::Replace { pattern, value } => match Regex::new(pattern) {
                Ok(re) => re.replace_all(&s, value.as_str()).into_owned(),
                Err(_) => s,
            },
            ValueOperation::PadStart { length, char } => pad(s, *length, *char, true),
            ValueOperation::PadEnd { length, char } => pad(s, *length, *char, false),
            ValueOperation::EnsurePrefix { value } if !s.starts_with(value.as_str()) => {
                format!("{}{}", value, s)
            }
            ValueOperation::EnsureSuffix { value } if !s.ends_with(value.as_str()) => {
                format!("{}{}", s, value)
            }
            ValueOperation::Map {
                mapping,
                case_insensitive,
                default,
            } => {
                let hit = if *case_insensitive {
                    let lower = s.to_lowercase();
                    mapping
                        .iter()
                        .find(|(k, _)| k.to_lowercase() == lower)
                        .map(|(_, v)| v.clone())
                } else {
                    mapping.get(&s).cloned()
                };
                hit.or_else(|| default.clone()).unwrap_or(s)
            }
            ValueOperation::Substring { start, length } => {
                let chars = s.chars().skip(*start);
                match length {
                    Some(n) => chars.take(*n).collect(),
                    None => chars.collect(),
                }
            }
            ValueOperation::Alphanumeric => s.chars().filter(|c| c.is_alphanumeric()).collect(),
            ValueOperation::DigitsOnly => s.chars().filter(|c| c.is_ascii_digit()).collect(),
            _ => s,
        }
    }
}

/// Lenient number parsing: whole text first, then with grouping spaces and
/// stray symbols removed (`"1 200 €"`, `"$3.50"`).
fn parse_number(text: &str) -> Option<f64> {
    let text = text.trim();
    if let Ok(f) = text.parse::<f64>() {
        return Some(f).filter(|f| f.is_finite());
    }
    let negative = text.starts_with('-');
    let kept: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if kept.is_empty() || kept == "." {
        return None;
    }
    let f = kept.parse::<f64>().ok()?;
    Some(if negative { -f } else { f })
}

fn parse_with_format(text: &str, fmt: &str) -> Option<chrono::NaiveDateTime> {
    let text = text.trim();
    chrono::NaiveDateTime::parse_from_str(text, fmt).ok().or_else(|| {
        chrono::NaiveDate::parse_from_str(text, fmt)
            .ok()
            .map(|d| d.and_time(chrono::NaiveTime::MIN))
    })
}

/// Apply a list of operations in order.
pub fn apply_all(operations: &[ValueOperation], value: &CellValue) -> CellValue {
    operations
        .iter()
        .fold(value.clone(), |acc, op| op.apply(&acc))
}

/// Reference table of the available operations, for `--help` style output.
pub fn operations_description() -> String {
    r#"Value operations (column operation "transform"):

| Operation     | Effect                                   | Parameters                                  |
|---------------|------------------------------------------|---------------------------------------------|
| trim          | Strip surrounding whitespace             | -                                           |
| uppercase     | Upper-case text                          | -                                           |
| lowercase     | Lower-case text                          | -                                           |
| replace       | Regex replacement                        | pattern, value                              |
| pad_start     | Left-pad to a length                     | length, char (default "0")                  |
| pad_end       | Right-pad to a length                    | length, char (default "0")                  |
| extract_year  | First 4-digit run as a number            | -                                           |
| ensure_prefix | Add a prefix when missing                | value                                       |
| ensure_suffix | Add a suffix when missing                | value                                       |
| map           | Lookup table                             | mapping, case_insensitive, default          |
| to_boolean    | Truthy text to true, anything else false | true_values                                 |
| to_number     | Parse a number, null when impossible     | -                                           |
| to_date       | Parse a date, null when impossible       | format (chrono syntax, optional)            |
| substring     | Character slice                          | start, length (optional)                    |
| alphanumeric  | Keep letters and digits                  | -                                           |
| digits_only   | Keep ASCII digits                        | -                                           |

Example:
{"type": "transform", "column": "phone", "operations": [
  {"type": "digits_only"},
  {"type": "ensure_prefix", "value": "+33"}
]}"#
    .to_string()
}
