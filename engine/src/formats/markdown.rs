//! Markdown pipe-table collaborator.
//!
//! Reads the first pipe table of a document, or the first table under the
//! heading named by the `sheet` option. Writes a single table, optionally
//! preceded by a `##` heading.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use super::{read_file, utf8_text, write_file, FormatHandler, ReadOptions, WriteOptions};
use crate::error::{FormatError, FormatResult};
use crate::models::{CellValue, Format, RecordSet, Row};
use crate::validation::ValidationReport;

static SEPARATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\|?\s*:?-{3,}:?\s*(\|\s*:?-{3,}:?\s*)*\|?\s*$").expect("valid regex")
});
static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6}\s+(.+?)\s*#*\s*$").expect("valid regex"));

#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownHandler;

fn is_table_line(line: &str) -> bool {
    let t = line.trim();
    t.starts_with('|') || (t.contains('|') && !t.is_empty())
}

/// Split one table line into trimmed, unescaped cells.
fn split_cells(line: &str) -> Vec<String> {
    let t = line.trim();
    let t = t.strip_prefix('|').unwrap_or(t);
    let t = if t.ends_with('|') && !t.ends_with("\\|") {
        &t[..t.len() - 1]
    } else {
        t
    };

    let mut cells = Vec::new();
    let mut current = String::new();
    let mut chars = t.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'|') => {
                current.push('|');
                chars.next();
            }
            '|' => cells.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    cells.push(current);
    cells
        .into_iter()
        .map(|c| c.trim().replace("<br>", "\n"))
        .collect()
}

/// Locate and parse a pipe table.
pub fn parse_table(
    text: &str,
    section: Option<&str>,
    infer_types: bool,
) -> Result<(Vec<String>, Vec<Row>), String> {
    let lines: Vec<&str> = text.lines().collect();

    let start = match section {
        None => 0,
        Some(name) => lines
            .iter()
            .position(|l| {
                HEADING
                    .captures(l)
                    .and_then(|c| c.get(1))
                    .is_some_and(|m| m.as_str().eq_ignore_ascii_case(name))
            })
            .map(|i| i + 1)
            .ok_or_else(|| format!("Section '{}' not found", name))?,
    };

    let header_idx = (start..lines.len().saturating_sub(1))
        .find(|&i| is_table_line(lines[i]) && SEPARATOR.is_match(lines[i + 1]))
        .ok_or_else(|| "No markdown pipe table found".to_string())?;

    let headers = split_cells(lines[header_idx]);
    let mut rows = Vec::new();

    for line in lines.iter().skip(header_idx + 2) {
        if line.trim().is_empty() || !is_table_line(line) {
            break;
        }
        let cells = split_cells(line);
        let row: Row = headers
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let raw = cells.get(i).map(String::as_str).unwrap_or("");
                let value = if infer_types {
                    CellValue::infer(raw)
                } else {
                    CellValue::String(raw.to_string())
                };
                (h.clone(), value)
            })
            .collect();
        rows.push(row);
    }

    Ok((headers, rows))
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
        .replace("\r\n", "<br>")
        .replace('\n', "<br>")
}

/// Render a record set as a markdown table.
pub fn render(set: &RecordSet, section: Option<&str>) -> String {
    let columns = set.columns();
    let mut out = String::new();

    if let Some(name) = section {
        out.push_str(&format!("## {}\n\n", name));
    }

    let header: Vec<String> = columns.iter().map(|c| escape_cell(c)).collect();
    out.push_str(&format!("| {} |\n", header.join(" | ")));
    out.push_str(&format!(
        "|{}|\n",
        columns.iter().map(|_| " --- ").collect::<Vec<_>>().join("|")
    ));

    for row in &set.rows {
        let cells: Vec<String> = columns
            .iter()
            .map(|c| {
                row.get(c)
                    .and_then(CellValue::to_text)
                    .map(|t| escape_cell(&t))
                    .unwrap_or_default()
            })
            .collect();
        out.push_str(&format!("| {} |\n", cells.join(" | ")));
    }
    out
}

impl FormatHandler for MarkdownHandler {
    fn format(&self) -> Format {
        Format::Markdown
    }

    fn read(&self, path: &Path, options: &ReadOptions) -> FormatResult<RecordSet> {
        let text = utf8_text(path, read_file(path)?)?;
        let (headers, rows) = parse_table(&text, options.sheet.as_deref(), options.infer_types)
            .map_err(|m| FormatError::malformed(path, m))?;

        let mut set = RecordSet::new(rows, Some(headers), Format::Markdown);
        if let Some(sheet) = &options.sheet {
            set = set.with_sheet_name(sheet.clone());
        }
        Ok(set)
    }

    fn write(&self, set: &RecordSet, path: &Path, options: &WriteOptions) -> FormatResult<()> {
        let section = options
            .sheet
            .as_deref()
            .or(set.metadata.sheet_name.as_deref());
        write_file(path, render(set, section).as_bytes())
    }

    fn validate(&self, set: &RecordSet) -> ValidationReport {
        let mut report = ValidationReport::new();
        if set.columns().is_empty() {
            report.error("A markdown table needs at least one column");
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

    const DOC: &str = "\
# Team

Intro text.

| name | age | note |
|------|----:|------|
| John | 30 | a \\| b |
| Jane | 25 | |

## Clients

| id | city |
| --- | --- |
| 7 | Lyon |
";

    #[test]
    fn test_first_table() {
        let (headers, rows) = parse_table(DOC, None, true).unwrap();
        assert_eq!(headers, vec!["name", "age", "note"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["age"], CellValue::from(30));
        assert_eq!(rows[0]["note"], CellValue::from("a | b"));
        assert_eq!(rows[1]["note"], CellValue::Null);
    }

    #[test]
    fn test_section_selector() {
        let (headers, rows) = parse_table(DOC, Some("clients"), true).unwrap();
        assert_eq!(headers, vec!["id", "city"]);
        assert_eq!(rows[0]["city"], CellValue::from("Lyon"));
        assert!(parse_table(DOC, Some("Vendors"), true).is_err());
    }

    #[test]
    fn test_no_table() {
        assert!(parse_table("# Just a heading\n\ntext", None, true).is_err());
    }

    #[test]
    fn test_render_escapes() {
        let mut row = Row::new();
        row.insert("k".into(), "x|y\nz".into());
        row.insert("n".into(), CellValue::Null);
        let set = RecordSet::new(vec![row], Some(vec!["k".into(), "n".into()]), Format::Csv);

        let out = render(&set, Some("Data"));
        assert_eq!(out, "## Data\n\n| k | n |\n| --- | --- |\n| x\\|y<br>z |  |\n");

        let (_, rows) = parse_table(&out, Some("Data"), true).unwrap();
        assert_eq!(rows[0]["k"], CellValue::from("x|y\nz"));
    }
}
