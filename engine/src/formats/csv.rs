//! Delimited-text collaborator with encoding and delimiter auto-detection.
//!
//! Reads CSV/TSV (any of `; , TAB |`) into a record set whose headers come
//! from the first line. Writes UTF-8 by default, or any encoding that
//! `encoding_rs` knows by label.

use encoding_rs::Encoding;
use std::path::Path;

use super::{read_file, write_file, FormatHandler, ReadOptions, WriteOptions};
use crate::api::logs::log_warning;
use crate::error::{FormatError, FormatResult};
use crate::models::{CellValue, Format, RecordSet, Row};
use crate::validation::ValidationReport;

/// Delimited-text handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvHandler;

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset.to_lowercase(),
    }
}

/// Decode bytes using the given encoding label.
///
/// UTF-8 that fails to decode is read lossily; unknown labels fall back to
/// lossy UTF-8 as well.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    let text = match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => String::from_utf8_lossy(bytes).to_string(),
        "iso-8859-1" | "latin-1" | "latin1" => {
            encoding_rs::ISO_8859_15.decode(bytes).0.to_string()
        }
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.to_string(),
        other => match Encoding::for_label(other.as_bytes()) {
            Some(enc) => enc.decode(bytes).0.to_string(),
            None => String::from_utf8_lossy(bytes).to_string(),
        },
    };
    match text.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => text,
    }
}

/// Encode text for writing. Characters the target cannot represent are
/// replaced, and reported through the returned flag.
pub fn encode_content(text: &str, encoding: &str) -> (Vec<u8>, bool) {
    match Encoding::for_label(encoding.as_bytes()) {
        Some(enc) if enc != encoding_rs::UTF_8 => {
            let (bytes, _, had_errors) = enc.encode(text);
            (bytes.into_owned(), had_errors)
        }
        _ => (text.as_bytes().to_vec(), false),
    }
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [';', ',', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse delimited text into a record set.
pub fn parse_str(
    content: &str,
    delimiter: char,
    infer_types: bool,
) -> Result<(Vec<String>, Vec<Row>), String> {
    if content.trim().is_empty() {
        return Err("CSV file is empty".to_string());
    }
    let delimiter = u8::try_from(delimiter)
        .map_err(|_| format!("Delimiter '{}' is not a single-byte character", delimiter))?;

    let mut reader = ::csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| format!("Cannot read header: {}", e))?
        .iter()
        .map(|s| s.trim().trim_matches('"').to_string())
        .collect();

    if headers.is_empty() {
        return Err("No headers found".to_string());
    }

    let mut rows = Vec::new();
    let mut ragged = 0;

    for (idx, record) in reader.records().enumerate() {
        let line = idx + 2; // +1 for 0-index, +1 for header
        let record = record.map_err(|e| format!("Line {}: {}", line, e))?;

        if record.iter().all(|v| v.trim().is_empty()) {
            continue;
        }
        if record.len() != headers.len() {
            ragged += 1;
        }

        let row: Row = headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                let raw = record.get(i).unwrap_or("");
                let value = if infer_types {
                    CellValue::infer(raw)
                } else {
                    CellValue::String(raw.to_string())
                };
                (header.clone(), value)
            })
            .collect();
        rows.push(row);
    }

    if ragged > 0 {
        log_warning(format!(
            "{} rows do not have {} fields (missing values read as empty, extras dropped)",
            ragged,
            headers.len()
        ));
    }

    Ok((headers, rows))
}

/// Render a record set as delimited text.
pub fn render(set: &RecordSet, delimiter: char) -> Result<String, String> {
    let delimiter = u8::try_from(delimiter)
        .map_err(|_| format!("Delimiter '{}' is not a single-byte character", delimiter))?;
    let columns = set.columns();

    let mut writer = ::csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());

    writer.write_record(&columns).map_err(|e| e.to_string())?;
    for row in &set.rows {
        let cells = columns
            .iter()
            .map(|c| row.get(c).and_then(CellValue::to_text).unwrap_or_default());
        writer.write_record(cells).map_err(|e| e.to_string())?;
    }

    let bytes = writer.into_inner().map_err(|e| e.to_string())?;
    String::from_utf8(bytes).map_err(|e| e.to_string())
}

impl FormatHandler for CsvHandler {
    fn format(&self) -> Format {
        Format::Csv
    }

    fn read(&self, path: &Path, options: &ReadOptions) -> FormatResult<RecordSet> {
        let bytes = read_file(path)?;

        let encoding = options
            .encoding
            .clone()
            .unwrap_or_else(|| detect_encoding(&bytes));
        let content = decode_content(&bytes, &encoding);

        let is_tsv = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("tsv"));
        let delimiter = options.delimiter.unwrap_or_else(|| {
            if is_tsv {
                '\t'
            } else {
                detect_delimiter(&content)
            }
        });

        let (headers, rows) = parse_str(&content, delimiter, options.infer_types)
            .map_err(|m| FormatError::malformed(path, m))?;

        Ok(RecordSet::new(rows, Some(headers), Format::Csv).with_encoding(encoding))
    }

    fn write(&self, set: &RecordSet, path: &Path, options: &WriteOptions) -> FormatResult<()> {
        let is_tsv = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("tsv"));
        let delimiter = options
            .delimiter
            .unwrap_or(if is_tsv { '\t' } else { ',' });

        let text = render(set, delimiter).map_err(|m| FormatError::malformed(path, m))?;

        let encoding = options.encoding.as_deref().unwrap_or("utf-8");
        let (bytes, lossy) = encode_content(&text, encoding);
        if lossy {
            log_warning(format!(
                "Some characters cannot be represented in {} and were replaced",
                encoding
            ));
        }
        write_file(path, &bytes)
    }

    fn validate(&self, set: &RecordSet) -> ValidationReport {
        let mut report = ValidationReport::new();

        for column in set.columns() {
            if column.contains('\n') || column.contains('\r') {
                report.error(format!("Column name {:?} contains a line break", column));
            }
        }

        let nested = set
            .rows
            .iter()
            .flat_map(|r| r.values())
            .filter(|v| v.is_nested())
            .count();
        if nested > 0 {
            report.warning(format!(
                "{} cells hold nested values and will be flattened to JSON text",
                nested
            ));
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_simple_csv() {
        let (headers, rows) = parse_str("name;age\nAlice;30\nBob;25", ';', true).unwrap();

        assert_eq!(headers, vec!["name", "age"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], CellValue::from("Alice"));
        assert_eq!(rows[0]["age"], CellValue::from(30));
        assert_eq!(rows[1]["name"], CellValue::from("Bob"));
    }

    #[test]
    fn test_without_inference_values_stay_text() {
        let (_, rows) = parse_str("a,b\n1,\n", ',', false).unwrap();
        assert_eq!(rows[0]["a"], CellValue::from("1"));
        assert_eq!(rows[0]["b"], CellValue::from(""));
    }

    #[test]
    fn test_quoted_values() {
        let csv = "name;value\n\"Alice\";\"Hello; World\"";
        let (_, rows) = parse_str(csv, ';', true).unwrap();

        assert_eq!(rows[0]["name"], CellValue::from("Alice"));
        assert_eq!(rows[0]["value"], CellValue::from("Hello; World"));
    }

    #[test]
    fn test_empty_lines_skipped() {
        let (_, rows) = parse_str("a;b\n1;2\n\n3;4\n", ';', true).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_missing_values() {
        let (_, rows) = parse_str("a;b;c\n1;;3", ';', true).unwrap();

        assert_eq!(rows[0]["a"], CellValue::from(1));
        assert_eq!(rows[0]["b"], CellValue::Null);
        assert_eq!(rows[0]["c"], CellValue::from(3));
    }

    #[test]
    fn test_short_and_long_rows() {
        let (_, rows) = parse_str("a;b\n1\n1;2;3;4", ';', true).unwrap();

        assert_eq!(rows[0]["b"], CellValue::Null);
        assert_eq!(rows[1].len(), 2);
    }

    #[test]
    fn test_empty_csv_error() {
        let err = parse_str("", ';', true).unwrap_err();
        assert!(err.contains("empty"));
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), ';');
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), ',');
        assert_eq!(detect_delimiter("a\tb\tc\n1\t2\t3"), '\t');
        assert_eq!(detect_delimiter("a|b|c\n1|2|3"), '|');
        assert_eq!(detect_delimiter("single"), ',');
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        assert_eq!(decode_content(bytes, "iso-8859-1"), "Société");
    }

    #[test]
    fn test_encode_windows_1252() {
        let (bytes, lossy) = encode_content("café", "windows-1252");
        assert_eq!(bytes, vec![0x63, 0x61, 0x66, 0xE9]);
        assert!(!lossy);

        let (bytes, _) = encode_content("café", "utf-8");
        assert_eq!(bytes, "café".as_bytes());
    }

    #[test]
    fn test_render_flattens_nested_and_nulls() {
        let mut row = Row::new();
        row.insert("id".into(), 1.into());
        row.insert("tags".into(), CellValue::List(vec!["a".into(), "b".into()]));
        row.insert("note".into(), CellValue::Null);
        let set = RecordSet::from_rows(vec![row], Format::Json);

        let text = render(&set, ',').unwrap();
        assert_eq!(text, "id,tags,note\n1,\"[\"\"a\"\",\"\"b\"\"]\",\n");
        assert!(!CsvHandler.validate(&set).warnings.is_empty());
    }

    #[test]
    fn test_file_roundtrip_with_tsv_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("people.tsv");
        std::fs::write(&path, "name\tage\nJohn\t30\n").unwrap();

        let set = CsvHandler.read(&path, &ReadOptions::default()).unwrap();
        assert_eq!(set.headers.as_deref(), Some(&["name".to_string(), "age".to_string()][..]));
        assert_eq!(set.metadata.encoding, "utf-8");

        let out = dir.path().join("copy.tsv");
        CsvHandler.write(&set, &out, &WriteOptions::default()).unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "name\tage\nJohn\t30\n");
    }

    #[test]
    fn test_malformed_delimiter_option() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();
        let options = ReadOptions {
            delimiter: Some('€'),
            ..ReadOptions::default()
        };
        let err = CsvHandler.read(&path, &options).unwrap_err();
        assert!(matches!(err, FormatError::Malformed { .. }));
    }
}
