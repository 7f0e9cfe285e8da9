//! Content sniffing over a bounded byte prefix.
//!
//! Each format signature yields a confidence that reflects how distinctive
//! it is: an XML declaration is near-certain, a line containing commas is
//! weak evidence.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::Format;

static XML_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^<([A-Za-z_][\w:.\-]*)[\s/>]").expect("valid regex"));
static MD_TABLE_ROW: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\|.*\|\s*$").expect("valid regex"));
static MD_TABLE_SEPARATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\|?\s*:?-{3,}:?\s*(\|\s*:?-{3,}:?\s*)*\|?\s*$").expect("valid regex")
});
static MD_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6}\s+\S").expect("valid regex"));
static MD_LIST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([-*+]|\d+\.)\s+\S").expect("valid regex"));

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const DELIMITERS: [(u8, &str); 4] = [(b',', "comma"), (b';', "semicolon"), (b'\t', "tab"), (b'|', "pipe")];
const MAX_SAMPLE_LINES: usize = 20;

/// One signature match.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentMatch {
    pub format: Format,
    pub confidence: f64,
    /// What was recognised, e.g. "XML declaration".
    pub signature: String,
}

impl ContentMatch {
    fn new(format: Format, confidence: f64, signature: impl Into<String>) -> Self {
        Self {
            format,
            confidence,
            signature: signature.into(),
        }
    }
}

/// Score `prefix` against every known signature and return the best match.
///
/// `truncated` tells the JSON heuristic that unclosed structures are
/// expected because the read stopped at the bound.
pub fn sniff(prefix: &[u8], truncated: bool) -> Option<ContentMatch> {
    if let Some(m) = sniff_binary(prefix) {
        return Some(m);
    }

    let text = String::from_utf8_lossy(prefix);
    let text = text.trim_start_matches('\u{feff}');
    if text.trim().is_empty() {
        return None;
    }

    let candidates = [
        sniff_xml(text),
        sniff_json(text, truncated),
        sniff_markdown(text),
        sniff_delimited(text, truncated),
    ];

    // Strictly greater wins, so earlier (more distinctive) signatures keep ties
    let mut best: Option<ContentMatch> = None;
    for m in candidates.into_iter().flatten() {
        if best.as_ref().map_or(true, |b| m.confidence > b.confidence) {
            best = Some(m);
        }
    }
    best
}

fn sniff_binary(prefix: &[u8]) -> Option<ContentMatch> {
    if prefix.starts_with(ZIP_MAGIC) {
        return Some(ContentMatch::new(Format::Excel, 0.7, "zip container (workbook)"));
    }
    if prefix.starts_with(OLE_MAGIC) {
        return Some(ContentMatch::new(Format::Excel, 0.75, "compound document (legacy workbook)"));
    }
    None
}

fn sniff_xml(text: &str) -> Option<ContentMatch> {
    let trimmed = text.trim_start();
    if trimmed.starts_with("<?xml") {
        return Some(ContentMatch::new(Format::Xml, 0.95, "XML declaration"));
    }
    let caps = XML_TAG.captures(trimmed)?;
    let name = caps.get(1)?.as_str();
    if text.contains(&format!("</{}>", name)) {
        Some(ContentMatch::new(Format::Xml, 0.8, format!("<{}> element", name)))
    } else {
        Some(ContentMatch::new(Format::Xml, 0.65, "leading XML tag"))
    }
}

/// Outcome of the balanced-delimiter scan.
#[derive(Debug, PartialEq)]
enum Balance {
    /// Everything closed, nothing but whitespace after.
    Complete,
    /// Still open at the end of input.
    Open,
    /// Mismatched closer or trailing content.
    Broken,
}

fn scan_balance(text: &str) -> Balance {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut closed_at = None;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(c) {
                    return Balance::Broken;
                }
                if stack.is_empty() {
                    closed_at = Some(i + c.len_utf8());
                    break;
                }
            }
            _ => {}
        }
    }

    match closed_at {
        Some(end) if text[end..].trim().is_empty() => Balance::Complete,
        Some(_) => Balance::Broken,
        None => Balance::Open,
    }
}

fn sniff_json(text: &str, truncated: bool) -> Option<ContentMatch> {
    let trimmed = text.trim();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return None;
    }
    match scan_balance(trimmed) {
        Balance::Complete => {
            if serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
                Some(ContentMatch::new(Format::Json, 0.95, "JSON document"))
            } else {
                Some(ContentMatch::new(Format::Json, 0.5, "balanced JSON-like brackets"))
            }
        }
        Balance::Open if truncated => Some(ContentMatch::new(
            Format::Json,
            0.85,
            "JSON structure (prefix truncated)",
        )),
        Balance::Open | Balance::Broken => None,
    }
}

fn sniff_markdown(text: &str) -> Option<ContentMatch> {
    let lines: Vec<&str> = text.lines().take(MAX_SAMPLE_LINES * 2).collect();

    let table_rows = lines.iter().filter(|l| MD_TABLE_ROW.is_match(l)).count();
    let has_separator = lines.iter().any(|l| l.contains('-') && MD_TABLE_SEPARATOR.is_match(l));
    if has_separator && table_rows >= 2 {
        return Some(ContentMatch::new(Format::Markdown, 0.9, "markdown pipe table"));
    }
    if lines.iter().any(|l| MD_HEADING.is_match(l)) {
        return Some(ContentMatch::new(Format::Markdown, 0.6, "markdown heading"));
    }
    let list_items = lines.iter().filter(|l| MD_LIST.is_match(l)).count();
    if list_items >= 2 {
        return Some(ContentMatch::new(Format::Markdown, 0.4, "markdown list markers"));
    }
    None
}

fn sniff_delimited(text: &str, truncated: bool) -> Option<ContentMatch> {
    let mut lines: Vec<&str> = text.lines().collect();
    if truncated && lines.len() > 1 {
        // Last line may be cut mid-record
        lines.pop();
    }
    let sample: Vec<&str> = lines
        .into_iter()
        .filter(|l| !l.trim().is_empty())
        .take(MAX_SAMPLE_LINES)
        .collect();
    if sample.is_empty() {
        return None;
    }
    let joined = sample.join("\n");

    let mut best: Option<ContentMatch> = None;
    for (delimiter, name) in DELIMITERS {
        let Some(counts) = field_counts(&joined, delimiter) else {
            continue;
        };
        let Some(&first) = counts.first() else {
            continue;
        };
        if first < 2 {
            continue;
        }
        let matching = counts.iter().filter(|&&c| c == first).count();
        let confidence = if counts.len() == 1 {
            0.4
        } else if matching == counts.len() {
            (0.6 + 0.05 * (counts.len() - 1) as f64).min(0.85)
        } else if matching * 5 >= counts.len() * 4 {
            0.45
        } else {
            continue;
        };
        if best.as_ref().map_or(true, |b| confidence > b.confidence) {
            best = Some(ContentMatch::new(
                Format::Csv,
                confidence,
                format!("consistent {} delimiter across {} lines", name, counts.len()),
            ));
        }
    }
    best
}

/// Field count of every record, or `None` if the sample is not parseable.
fn field_counts(sample: &str, delimiter: u8) -> Option<Vec<usize>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(sample.as_bytes());
    reader
        .records()
        .map(|r| r.ok().map(|rec| rec.len()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn best(text: &str) -> ContentMatch {
        sniff(text.as_bytes(), false).expect("a match")
    }

    #[test]
    fn test_xml_declaration_beats_plain_tag() {
        let decl = best("<?xml version=\"1.0\"?><a/>");
        let tag = best("<rows><row>1</row></rows>");
        assert_eq!(decl.format, Format::Xml);
        assert_eq!(tag.format, Format::Xml);
        assert!(decl.confidence > tag.confidence);
    }

    #[test]
    fn test_json_document() {
        let m = best(r#"[{"a": 1, "b": "x,y"}]"#);
        assert_eq!(m.format, Format::Json);
        assert_eq!(m.confidence, 0.95);
    }

    #[test]
    fn test_json_balance_respects_strings() {
        assert_eq!(scan_balance(r#"{"a": "}]"}"#), Balance::Complete);
        assert_eq!(scan_balance(r#"{"a": [1, 2"#), Balance::Open);
        assert_eq!(scan_balance(r#"{"a": [1, 2}"#), Balance::Broken);
    }

    #[test]
    fn test_truncated_json_only_when_truncated() {
        let text = r#"[{"id": 1}, {"id": 2"#;
        assert_eq!(sniff_json(text, true).map(|m| m.format), Some(Format::Json));
        assert!(sniff_json(text, false).is_none());
    }

    #[test]
    fn test_delimited_text() {
        let m = best("name;age\nJohn;30\nJane;25\n");
        assert_eq!(m.format, Format::Csv);
        assert!(m.signature.contains("semicolon"));
        assert!(m.confidence > 0.6);
    }

    #[test]
    fn test_tab_delimited() {
        let m = best("a\tb\tc\n1\t2\t3\n");
        assert!(m.signature.contains("tab"));
    }

    #[test]
    fn test_single_comma_line_is_weak() {
        let m = best("hello, world");
        assert_eq!(m.format, Format::Csv);
        assert!(m.confidence < 0.5);
    }

    #[test]
    fn test_markdown_table_beats_pipe_delimited() {
        let m = best("| name | age |\n|------|-----|\n| John | 30 |\n");
        assert_eq!(m.format, Format::Markdown);
    }

    #[test]
    fn test_markdown_heading() {
        let m = best("# Title\n\nSome text.\n");
        assert_eq!(m.format, Format::Markdown);
        assert_eq!(m.confidence, 0.6);
    }

    #[test]
    fn test_workbook_magic() {
        let m = sniff(b"PK\x03\x04rest-of-zip", false).unwrap();
        assert_eq!(m.format, Format::Excel);
    }

    #[test]
    fn test_plain_prose_has_no_match() {
        assert!(sniff(b"just some words", false).is_none());
        assert!(sniff(b"   \n", false).is_none());
    }
}
