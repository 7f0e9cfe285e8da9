//! End-to-end conversions through the public API.

use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;
use tabconv::{
    ConversionRequest, Converter, DetectionMethod, EngineConfig, Format, FormatDetector,
    Transformation,
};
use tempfile::TempDir;

const PEOPLE_CSV: &str = "name,age,email\nJohn,30,john@x.com\nJane,25,jane@x.com\n";

fn converter() -> Converter {
    Converter::with_defaults(EngineConfig::default())
}

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

fn steps(value: Value) -> Vec<Transformation> {
    serde_json::from_value(value).unwrap()
}

fn read_json(path: &PathBuf) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_filter_reports_dropped_rows() {
    let dir = TempDir::new().unwrap();
    let source = write(&dir, "people.csv", PEOPLE_CSV);

    let request = ConversionRequest::new(&source, Format::Json).with_transformations(steps(json!([
        {"type": "filter", "parameters": {"columnFilters": [
            {"column": "age", "operator": "greaterThan", "value": 25}
        ]}}
    ])));
    let outcome = converter().convert(&request);

    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(outcome.rows, Some(1));
    assert!(outcome
        .warnings
        .contains(&"1 rows were filtered out during transformation".to_string()));

    let written = read_json(&dir.path().join("people.json"));
    assert_eq!(written, json!([{"name": "John", "age": 30, "email": "john@x.com"}]));
}

#[test]
fn test_add_column_then_repeat_fails() {
    let dir = TempDir::new().unwrap();
    let source = write(&dir, "people.csv", PEOPLE_CSV);
    let output = dir.path().join("with_status.json");

    let add = json!({"type": "columnOperation", "parameters": {
        "type": "add", "name": "status", "default": "active"
    }});
    let request = ConversionRequest::new(&source, Format::Json)
        .with_output(&output)
        .with_transformations(steps(json!([add])));
    let outcome = converter().convert(&request);

    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(outcome.columns, Some(4));
    assert!(outcome
        .warnings
        .contains(&"1 columns were added during transformation".to_string()));
    let written = read_json(&output);
    assert_eq!(written[0]["status"], "active");
    assert_eq!(written[1]["status"], "active");

    // Same add on the converted file: the column is already there
    let again = ConversionRequest::new(&output, Format::Csv).with_transformations(steps(json!([add])));
    let outcome = converter().convert(&again);
    assert!(!outcome.success);
    assert_eq!(outcome.stage.as_deref(), Some("transform"));
    assert!(outcome.message.contains("already exists"));
    assert!(!dir.path().join("with_status.csv").exists());
}

#[test]
fn test_key_style_to_camel_case() {
    let dir = TempDir::new().unwrap();
    let source = write(&dir, "names.csv", "first_name,last_name\nAda,Lovelace\n");

    let request = ConversionRequest::new(&source, Format::Json).with_transformations(steps(json!([
        {"type": "keyStyle", "parameters": "camelCase"},
        {"type": "keyStyle", "parameters": {"style": "camelCase"}}
    ])));
    let outcome = converter().convert(&request);
    assert!(outcome.success, "{}", outcome.message);

    let written = read_json(&dir.path().join("names.json"));
    assert_eq!(written, json!([{"firstName": "Ada", "lastName": "Lovelace"}]));
}

#[test]
fn test_txt_with_json_content_is_detected() {
    let dir = TempDir::new().unwrap();
    let source = write(&dir, "export.txt", r#"{"a":1}"#);

    let detection = FormatDetector::default().detect(&source, true).unwrap();
    assert_eq!(detection.format, Format::Json);
    assert!(matches!(
        detection.method,
        DetectionMethod::Content | DetectionMethod::Hybrid
    ));
    assert!(detection.confidence > 0.8);

    // Without sniffing there is nothing to go on
    assert!(FormatDetector::default().detect(&source, false).is_err());

    let outcome = converter().convert(&ConversionRequest::new(&source, Format::Csv));
    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(outcome.detection.map(|d| d.format), Some(Format::Json));
    assert_eq!(fs::read_to_string(dir.path().join("export.csv")).unwrap(), "a\n1\n");
}

#[test]
fn test_missing_source() {
    let dir = TempDir::new().unwrap();
    let outcome = converter().convert(&ConversionRequest::new(dir.path().join("nope.csv"), Format::Json));

    assert!(!outcome.success);
    assert_eq!(outcome.stage.as_deref(), Some("io"));
    assert!(outcome.message.contains("File not found"));
    assert!(outcome.detection.is_none());
}

#[test]
fn test_target_without_handler() {
    let dir = TempDir::new().unwrap();
    let source = write(&dir, "people.csv", PEOPLE_CSV);

    let outcome = converter().convert(&ConversionRequest::new(&source, Format::Xml));
    assert!(!outcome.success);
    assert_eq!(outcome.stage.as_deref(), Some("lookup"));
    assert!(outcome.message.contains("xml"));
    // Detection had already succeeded
    assert_eq!(outcome.detection.map(|d| d.format), Some(Format::Csv));
    assert!(!dir.path().join("people.xml").exists());
}

#[test]
fn test_output_must_differ_from_source() {
    let dir = TempDir::new().unwrap();
    let source = write(&dir, "people.csv", PEOPLE_CSV);

    let outcome = converter().convert(&ConversionRequest::new(&source, Format::Csv));
    assert!(!outcome.success);
    assert_eq!(outcome.stage.as_deref(), Some("request"));
    assert_eq!(fs::read_to_string(&source).unwrap(), PEOPLE_CSV);
}

#[test]
fn test_csv_to_markdown_with_column_operations() {
    let dir = TempDir::new().unwrap();
    let source = write(&dir, "people.csv", PEOPLE_CSV);

    let request = ConversionRequest::new(&source, Format::Markdown).with_transformations(steps(json!([
        {"type": "columnOperation", "parameters": [
            {"type": "remove", "name": "email"},
            {"type": "rename", "name": "name", "newName": "who"},
            {"type": "transform", "column": "who", "operations": [{"type": "uppercase"}]}
        ]},
        {"type": "somethingNewer", "parameters": {}}
    ])));
    let outcome = converter().convert(&request);
    assert!(outcome.success, "{}", outcome.message);
    assert!(outcome.warnings.iter().any(|w| w.contains("somethingNewer")));
    assert!(outcome
        .warnings
        .contains(&"1 columns were removed during transformation".to_string()));

    let text = fs::read_to_string(dir.path().join("people.md")).unwrap();
    assert_eq!(
        text,
        "| who | age |\n| --- | --- |\n| JOHN | 30 |\n| JANE | 25 |\n"
    );
}

#[test]
fn test_filter_on_ragged_json_keeps_column_count() {
    let dir = TempDir::new().unwrap();
    let source = write(&dir, "ragged.json", r#"[{"a":1},{"a":2,"b":3,"c":4}]"#);
    let output = dir.path().join("kept.json");

    let request = ConversionRequest::new(&source, Format::Json)
        .with_output(&output)
        .with_transformations(steps(json!([
            {"type": "filter", "parameters": {"columnFilters": [
                {"column": "a", "operator": "equals", "value": 2}
            ]}}
        ])));
    let outcome = converter().convert(&request);

    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(
        outcome.warnings,
        vec!["1 rows were filtered out during transformation".to_string()]
    );
    assert_eq!(read_json(&output), json!([{"a": 2, "b": 3, "c": 4}]));
}
