//! JSON collaborator.
//!
//! Accepted layouts:
//!
//! - an array of objects, one per row;
//! - a single object, read as one row;
//! - an envelope `{"headers": [...], "rows": [...]}`;
//! - an object of named arrays, with the array picked by the `sheet` option.
//!
//! Nested values are kept as they are.

use serde_json::{Map, Value};
use std::path::Path;

use super::{read_file, utf8_text, write_file, FormatHandler, ReadOptions, WriteOptions};
use crate::error::{FormatError, FormatResult};
use crate::models::{CellValue, Format, RecordSet, Row};

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonHandler;

/// Turn parsed JSON into rows and optional headers.
pub fn rows_from_value(
    value: Value,
    sheet: Option<&str>,
) -> Result<(Vec<Row>, Option<Vec<String>>), String> {
    match value {
        Value::Array(items) => Ok((rows_from_array(items)?, None)),
        Value::Object(mut obj) => {
            if let Some(name) = sheet {
                return match obj.remove(name) {
                    Some(Value::Array(items)) => Ok((rows_from_array(items)?, None)),
                    Some(_) => Err(format!("Section '{}' is not an array", name)),
                    None => Err(format!("Section '{}' not found", name)),
                };
            }
            if let Some(Value::Array(_)) = obj.get("rows") {
                return envelope(obj);
            }
            Ok((vec![row_from_object(obj)], None))
        }
        other => Err(format!(
            "Expected an array of objects or an object, found {}",
            json_type(&other)
        )),
    }
}

fn envelope(mut obj: Map<String, Value>) -> Result<(Vec<Row>, Option<Vec<String>>), String> {
    let rows = match obj.remove("rows") {
        Some(Value::Array(items)) => rows_from_array(items)?,
        _ => Vec::new(),
    };
    let headers = match obj.remove("headers") {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => Some(
            items
                .into_iter()
                .map(|h| match h {
                    Value::String(s) => Ok(s),
                    other => Err(format!("Header {} is not a string", other)),
                })
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Some(other) => return Err(format!("\"headers\" must be an array, found {}", json_type(&other))),
    };
    Ok((rows, headers))
}

fn rows_from_array(items: Vec<Value>) -> Result<Vec<Row>, String> {
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(obj) => Ok(row_from_object(obj)),
            other => Err(format!("Item {} is {}, not an object", i, json_type(&other))),
        })
        .collect()
}

fn row_from_object(obj: Map<String, Value>) -> Row {
    obj.into_iter().map(|(k, v)| (k, CellValue::from(v))).collect()
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl FormatHandler for JsonHandler {
    fn format(&self) -> Format {
        Format::Json
    }

    fn read(&self, path: &Path, options: &ReadOptions) -> FormatResult<RecordSet> {
        let text = utf8_text(path, read_file(path)?)?;
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| FormatError::malformed(path, e.to_string()))?;

        let (rows, headers) = rows_from_value(value, options.sheet.as_deref())
            .map_err(|m| FormatError::malformed(path, m))?;

        let mut set = RecordSet::new(rows, headers, Format::Json);
        if let Some(sheet) = &options.sheet {
            set = set.with_sheet_name(sheet.clone());
        }
        Ok(set)
    }

    fn write(&self, set: &RecordSet, path: &Path, options: &WriteOptions) -> FormatResult<()> {
        let text = if options.pretty {
            serde_json::to_string_pretty(&set.rows)
        } else {
            serde_json::to_string(&set.rows)
        }
        .map_err(|e| FormatError::malformed(path, e.to_string()))?;

        let mut bytes = text.into_bytes();
        bytes.push(b'\n');
        write_file(path, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_array_of_objects() {
        let (rows, headers) = rows_from_value(
            json!([{"name": "John", "age": 30}, {"name": "Jane", "email": "jane@x.com"}]),
            None,
        )
        .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(headers.is_none());
        assert_eq!(rows[1]["email"], CellValue::from("jane@x.com"));
        assert!(!rows[1].contains_key("age"));
    }

    #[test]
    fn test_single_object_is_one_row() {
        let (rows, _) = rows_from_value(json!({"a": 1}), None).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_envelope_with_headers() {
        let (rows, headers) = rows_from_value(
            json!({"headers": ["b", "a"], "rows": [{"a": 1, "b": 2}]}),
            None,
        )
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(headers, Some(vec!["b".to_string(), "a".to_string()]));
    }

    #[test]
    fn test_section_selector() {
        let doc = json!({"staff": [{"id": 1}], "clients": [{"id": 2}, {"id": 3}]});
        let (rows, _) = rows_from_value(doc.clone(), Some("clients")).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows_from_value(doc, Some("vendors")).is_err());
    }

    #[test]
    fn test_non_object_items_rejected() {
        let err = rows_from_value(json!([{"a": 1}, 2]), None).unwrap_err();
        assert!(err.contains("Item 1"));
        assert!(rows_from_value(json!("text"), None).is_err());
    }

    #[test]
    fn test_read_write_keeps_key_order_and_nesting() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("in.json");
        std::fs::write(&path, r#"[{"z": 1, "a": {"inner": [1, 2]}}]"#).unwrap();

        let set = JsonHandler.read(&path, &ReadOptions::default()).unwrap();
        assert_eq!(set.rows[0].keys().collect::<Vec<_>>(), vec!["z", "a"]);

        let out = dir.path().join("out.json");
        let options = WriteOptions { pretty: false, ..WriteOptions::default() };
        JsonHandler.write(&set, &out, &options).unwrap();
        assert_eq!(
            std::fs::read_to_string(&out).unwrap(),
            "[{\"z\":1,\"a\":{\"inner\":[1,2]}}]\n"
        );
    }

    #[test]
    fn test_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{\"a\": ").unwrap();
        let err = JsonHandler.read(&path, &ReadOptions::default()).unwrap_err();
        assert!(matches!(err, FormatError::Malformed { .. }));
    }
}
