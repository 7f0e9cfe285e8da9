//! Cell values carried by every row of a [`RecordSet`](super::RecordSet).
//!
//! Mirrors `serde_json::Value` with two differences: objects keep insertion
//! order through [`IndexMap`], and dates are a first-class variant so that
//! filters and statistics can compare them without re-parsing.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use indexmap::IndexMap;
use serde::de::Deserializer;
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::fmt;

/// One row: column name to value, in column order.
pub type Row = IndexMap<String, CellValue>;

/// A single cell.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    /// Absent or empty.
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    /// Calendar date, optionally with a time of day.
    Date(NaiveDateTime),
    /// Nested mapping (tree-like formats only).
    Map(IndexMap<String, CellValue>),
    /// Nested sequence (tree-like formats only).
    List(Vec<CellValue>),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// True for nested mappings and sequences.
    pub fn is_nested(&self) -> bool {
        matches!(self, CellValue::Map(_) | CellValue::List(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of a `Number` cell. Strings are not coerced here,
    /// see [`crate::transform::compare`] for coercing comparisons.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    /// Build a number cell, keeping integral values integral.
    pub fn number(n: f64) -> Self {
        if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
            return CellValue::Number(Number::from(n as i64));
        }
        Number::from_f64(n)
            .map(CellValue::Number)
            .unwrap_or(CellValue::Null)
    }

    /// Text form of the value, `None` for null.
    ///
    /// Nested values are rendered as compact JSON, which is also how flat
    /// formats store them.
    pub fn to_text(&self) -> Option<String> {
        match self {
            CellValue::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Null, or a string that is empty after trimming.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Null => true,
            CellValue::String(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Short type name used in statistics and diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            CellValue::Null => "null",
            CellValue::Bool(_) => "boolean",
            CellValue::Number(_) => "number",
            CellValue::String(_) => "string",
            CellValue::Date(_) => "date",
            CellValue::Map(_) => "map",
            CellValue::List(_) => "list",
        }
    }

    /// Interpret raw text from a flat format.
    ///
    /// Empty text becomes null, integers and floats become numbers and
    /// `true`/`false` become booleans. Everything else stays a string.
    pub fn infer(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return CellValue::Null;
        }
        match trimmed {
            "true" | "TRUE" | "True" => return CellValue::Bool(true),
            "false" | "FALSE" | "False" => return CellValue::Bool(false),
            _ => {}
        }
        // Leading zeros are identifiers (zip codes, phone numbers), not numbers
        let leading_zero = trimmed.len() > 1
            && trimmed.starts_with('0')
            && !trimmed.starts_with("0.");
        if !leading_zero {
            if let Ok(i) = trimmed.parse::<i64>() {
                return CellValue::Number(Number::from(i));
            }
            if let Ok(f) = trimmed.parse::<f64>() {
                if f.is_finite() {
                    if let Some(n) = Number::from_f64(f) {
                        return CellValue::Number(n);
                    }
                }
            }
        }
        CellValue::String(raw.to_string())
    }

    /// Convert to a plain JSON value (dates become ISO strings).
    pub fn to_json(&self) -> Value {
        match self {
            CellValue::Null => Value::Null,
            CellValue::Bool(b) => Value::Bool(*b),
            CellValue::Number(n) => Value::Number(n.clone()),
            CellValue::String(s) => Value::String(s.clone()),
            CellValue::Date(d) => Value::String(format_date(d)),
            CellValue::Map(m) => Value::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            CellValue::List(l) => Value::Array(l.iter().map(CellValue::to_json).collect()),
        }
    }
}

/// ISO rendering; midnight timestamps print as a bare date.
pub fn format_date(d: &NaiveDateTime) -> String {
    if d.time() == NaiveTime::MIN {
        d.format("%Y-%m-%d").to_string()
    } else {
        d.format("%Y-%m-%dT%H:%M:%S").to_string()
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::String(s) => f.write_str(s),
            CellValue::Date(d) => f.write_str(&format_date(d)),
            nested => write!(f, "{}", nested.to_json()),
        }
    }
}

impl From<Value> for CellValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => CellValue::Null,
            Value::Bool(b) => CellValue::Bool(b),
            Value::Number(n) => CellValue::Number(n),
            Value::String(s) => CellValue::String(s),
            Value::Array(a) => CellValue::List(a.into_iter().map(CellValue::from).collect()),
            Value::Object(o) => CellValue::Map(
                o.into_iter().map(|(k, v)| (k, CellValue::from(v))).collect(),
            ),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::String(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::String(s)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Number(Number::from(n))
    }
}

impl From<i32> for CellValue {
    fn from(n: i32) -> Self {
        CellValue::Number(Number::from(n))
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::number(n)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(d: NaiveDate) -> Self {
        CellValue::Date(d.and_time(NaiveTime::MIN))
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(d: NaiveDateTime) -> Self {
        CellValue::Date(d)
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::Null => serializer.serialize_unit(),
            CellValue::Bool(b) => serializer.serialize_bool(*b),
            CellValue::Number(n) => n.serialize(serializer),
            CellValue::String(s) => serializer.serialize_str(s),
            CellValue::Date(d) => serializer.serialize_str(&format_date(d)),
            CellValue::Map(m) => {
                let mut map = serializer.serialize_map(Some(m.len()))?;
                for (k, v) in m {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            CellValue::List(l) => {
                let mut seq = serializer.serialize_seq(Some(l.len()))?;
                for v in l {
                    seq.serialize_element(v)?;
                }
                seq.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for CellValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(CellValue::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_infer_scalars() {
        assert_eq!(CellValue::infer(""), CellValue::Null);
        assert_eq!(CellValue::infer("  "), CellValue::Null);
        assert_eq!(CellValue::infer("30"), CellValue::from(30));
        assert_eq!(CellValue::infer("2.5").as_f64(), Some(2.5));
        assert_eq!(CellValue::infer("true"), CellValue::Bool(true));
        assert_eq!(CellValue::infer("hello"), CellValue::from("hello"));
    }

    #[test]
    fn test_infer_keeps_leading_zero_identifiers() {
        assert_eq!(CellValue::infer("00501"), CellValue::from("00501"));
        assert_eq!(CellValue::infer("0.5").as_f64(), Some(0.5));
        assert_eq!(CellValue::infer("0"), CellValue::from(0));
    }

    #[test]
    fn test_json_roundtrip_preserves_key_order() {
        let value = json!({"zeta": 1, "alpha": {"b": [1, 2], "a": null}});
        let cell = CellValue::from(value.clone());
        let CellValue::Map(ref m) = cell else {
            panic!("expected map");
        };
        assert_eq!(m.keys().collect::<Vec<_>>(), vec!["zeta", "alpha"]);
        assert_eq!(serde_json::to_value(&cell).unwrap(), value);
    }

    #[test]
    fn test_date_display() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(CellValue::from(d).to_string(), "2024-03-15");
        let dt = d.and_hms_opt(10, 30, 0).unwrap();
        assert_eq!(CellValue::from(dt).to_string(), "2024-03-15T10:30:00");
    }

    #[test]
    fn test_number_keeps_integers_integral() {
        assert_eq!(CellValue::number(4.0).to_string(), "4");
        assert_eq!(CellValue::number(4.5).to_string(), "4.5");
    }
}
