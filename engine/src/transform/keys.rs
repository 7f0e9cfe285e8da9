//! Key style transformation.
//!
//! Renames every key of a record set (headers, row keys and keys of nested
//! mappings) to one naming convention. Keys already canonical for the
//! target style are left alone, which makes the transform idempotent.
//!
//! Two distinct keys can end up with the same name (`first-name` and
//! `first_name` both become `firstName`). [`transform_keys`] lets that
//! happen; [`find_key_collisions`] reports it after the fact and
//! [`transform_keys_strict`] refuses to proceed.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::error::{TransformError, TransformResult};
use crate::models::{CellValue, RecordSet, Row};

static CAMEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9]*(?:[A-Z][a-z0-9]*)*$").expect("valid regex"));
static SNAKE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]+(?:_[a-z0-9]+)*$").expect("valid regex"));
static LOWER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9_]+$").expect("valid regex"));
static UPPER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z0-9_]+$").expect("valid regex"));

// =============================================================================
// Styles
// =============================================================================

/// Target naming convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyStyle {
    #[serde(rename = "camelCase")]
    CamelCase,
    #[serde(rename = "snake_case")]
    SnakeCase,
    #[serde(rename = "lowercase")]
    Lowercase,
    #[serde(rename = "uppercase")]
    Uppercase,
}

impl KeyStyle {
    pub const ALL: [KeyStyle; 4] = [
        KeyStyle::CamelCase,
        KeyStyle::SnakeCase,
        KeyStyle::Lowercase,
        KeyStyle::Uppercase,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            KeyStyle::CamelCase => "camelCase",
            KeyStyle::SnakeCase => "snake_case",
            KeyStyle::Lowercase => "lowercase",
            KeyStyle::Uppercase => "uppercase",
        }
    }

    /// Whether `key` is already in this style.
    pub fn is_canonical(&self, key: &str) -> bool {
        match self {
            KeyStyle::CamelCase => CAMEL.is_match(key),
            KeyStyle::SnakeCase => SNAKE.is_match(key),
            KeyStyle::Lowercase => LOWER.is_match(key),
            KeyStyle::Uppercase => UPPER.is_match(key),
        }
    }

    /// Convert a single key.
    pub fn apply(&self, key: &str) -> String {
        if key.is_empty() || self.is_canonical(key) {
            return key.to_string();
        }
        let words = tokenize(key);
        if words.is_empty() {
            return key.to_string();
        }
        match self {
            KeyStyle::CamelCase => words
                .iter()
                .enumerate()
                .map(|(i, w)| if i == 0 { w.clone() } else { capitalize(w) })
                .collect(),
            KeyStyle::SnakeCase | KeyStyle::Lowercase => words.join("_"),
            KeyStyle::Uppercase => words.join("_").to_uppercase(),
        }
    }
}

impl fmt::Display for KeyStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for KeyStyle {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', '_'], "").as_str() {
            "camelcase" | "camel" => Ok(KeyStyle::CamelCase),
            "snakecase" | "snake" => Ok(KeyStyle::SnakeCase),
            "lowercase" | "lower" => Ok(KeyStyle::Lowercase),
            "uppercase" | "upper" => Ok(KeyStyle::Uppercase),
            _ => Err(TransformError::InvalidOperation(format!(
                "unknown key style '{}' (expected camelCase, snake_case, lowercase or uppercase)",
                s
            ))),
        }
    }
}

/// Split a key into lowercase words.
///
/// Boundaries are whitespace, punctuation, a lower-to-upper change
/// (`firstName`) and the end of an acronym (`HTTPServer` gives `http`,
/// `server`). Digits stay attached to the preceding word.
pub fn tokenize(key: &str) -> Vec<String> {
    let chars: Vec<char> = key.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower) {
                words.push(std::mem::take(&mut current));
            }
        }
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// =============================================================================
// Record set transforms
// =============================================================================

/// Memoised renamer so every occurrence of a key gets the same name.
struct Renamer {
    style: KeyStyle,
    cache: HashMap<String, String>,
}

impl Renamer {
    fn new(style: KeyStyle) -> Self {
        Self {
            style,
            cache: HashMap::new(),
        }
    }

    fn key(&mut self, key: &str) -> String {
        if let Some(done) = self.cache.get(key) {
            return done.clone();
        }
        let renamed = self.style.apply(key);
        self.cache.insert(key.to_string(), renamed.clone());
        renamed
    }

    fn row(&mut self, row: &Row) -> Row {
        row.iter()
            .map(|(k, v)| (self.key(k), self.value(v)))
            .collect()
    }

    fn value(&mut self, value: &CellValue) -> CellValue {
        match value {
            CellValue::Map(m) => CellValue::Map(self.row(m)),
            CellValue::List(items) => CellValue::List(items.iter().map(|v| self.value(v)).collect()),
            other => other.clone(),
        }
    }
}

/// Rename every key of `set` to `style`.
pub fn transform_keys(set: &RecordSet, style: KeyStyle) -> RecordSet {
    let mut renamer = Renamer::new(style);
    let headers: Option<Vec<String>> = set
        .headers
        .as_ref()
        .map(|h| h.iter().map(|k| renamer.key(k)).collect());
    let rows: Vec<Row> = set.rows.iter().map(|r| renamer.row(r)).collect();

    let mut out = RecordSet {
        rows,
        headers,
        metadata: set.metadata.clone(),
    };
    out.refresh_counts();
    out
}

/// Like [`transform_keys`], but fails when two distinct top-level keys
/// would share a name.
pub fn transform_keys_strict(set: &RecordSet, style: KeyStyle) -> TransformResult<RecordSet> {
    if let Some(collision) = find_key_collisions(&set.columns(), style).into_iter().next() {
        return Err(TransformError::KeyCollision {
            target: collision.target,
            sources: collision.sources,
        });
    }
    Ok(transform_keys(set, style))
}

/// Distinct keys that one style maps to the same name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyCollision {
    pub target: String,
    pub sources: Vec<String>,
}

/// Post-hoc collision check, in first-seen order of the target names.
pub fn find_key_collisions(keys: &[String], style: KeyStyle) -> Vec<KeyCollision> {
    let mut groups: IndexMap<String, Vec<String>> = IndexMap::new();
    for key in keys {
        let sources = groups.entry(style.apply(key)).or_default();
        if !sources.contains(key) {
            sources.push(key.clone());
        }
    }
    groups
        .into_iter()
        .filter(|(_, sources)| sources.len() > 1)
        .map(|(target, sources)| KeyCollision { target, sources })
        .collect()
}

// =============================================================================
// Style diagnostics
// =============================================================================

/// Advisory report on the naming convention a key list follows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyStyleReport {
    /// Dominant bucket: a style name or `mixed`.
    pub style: String,
    /// Share of keys in the dominant bucket.
    pub confidence: f64,
    pub counts: BTreeMap<String, usize>,
}

fn bucket(key: &str) -> &'static str {
    let has_upper = key.chars().any(char::is_uppercase);
    let has_lower = key.chars().any(char::is_lowercase);
    if SNAKE.is_match(key) && key.contains('_') {
        "snake_case"
    } else if CAMEL.is_match(key) && has_upper {
        "camelCase"
    } else if UPPER.is_match(key) && !has_lower {
        "uppercase"
    } else if LOWER.is_match(key) {
        "lowercase"
    } else {
        "mixed"
    }
}

/// Bucket `keys` by style and report the dominant one.
pub fn detect_key_style(keys: &[String]) -> KeyStyleReport {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for key in keys.iter().filter(|k| !k.is_empty()) {
        *counts.entry(bucket(key).to_string()).or_default() += 1;
    }
    let total: usize = counts.values().sum();

    // Ties resolve alphabetically through the BTreeMap order
    let dominant = counts
        .iter()
        .fold(None::<(&String, usize)>, |best, (k, &n)| match best {
            Some((_, m)) if m >= n => best,
            _ => Some((k, n)),
        });

    match dominant {
        Some((style, n)) if total > 0 => KeyStyleReport {
            style: style.clone(),
            confidence: n as f64 / total as f64,
            counts,
        },
        _ => KeyStyleReport {
            style: "mixed".to_string(),
            confidence: 0.0,
            counts,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Format;

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn set_with_headers(headers: &[&str]) -> RecordSet {
        let row: Row = headers
            .iter()
            .map(|h| (h.to_string(), CellValue::from(1)))
            .collect();
        RecordSet::new(vec![row], Some(keys(headers)), Format::Csv)
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("first_name"), vec!["first", "name"]);
        assert_eq!(tokenize("First Name"), vec!["first", "name"]);
        assert_eq!(tokenize("firstName"), vec!["first", "name"]);
        assert_eq!(tokenize("HTTPServer-url"), vec!["http", "server", "url"]);
        assert_eq!(tokenize("address2Line"), vec!["address2", "line"]);
        assert!(tokenize("--").is_empty());
    }

    #[test]
    fn test_styles() {
        assert_eq!(KeyStyle::CamelCase.apply("first_name"), "firstName");
        assert_eq!(KeyStyle::SnakeCase.apply("firstName"), "first_name");
        assert_eq!(KeyStyle::Lowercase.apply("First Name"), "first_name");
        assert_eq!(KeyStyle::Uppercase.apply("first-name"), "FIRST_NAME");
        assert_eq!(KeyStyle::SnakeCase.apply(""), "");
        assert_eq!(KeyStyle::CamelCase.apply("##"), "##");
    }

    #[test]
    fn test_snake_to_camel_then_idempotent() {
        let set = set_with_headers(&["first_name", "last_name"]);
        let once = transform_keys(&set, KeyStyle::CamelCase);
        assert_eq!(once.headers, Some(keys(&["firstName", "lastName"])));
        assert_eq!(once.rows[0].keys().collect::<Vec<_>>(), vec!["firstName", "lastName"]);

        let twice = transform_keys(&once, KeyStyle::CamelCase);
        assert_eq!(twice, once);
    }

    #[test]
    fn test_nested_keys_are_renamed() {
        let mut inner = Row::new();
        inner.insert("zip_code".into(), "75001".into());
        let mut row = Row::new();
        row.insert(
            "home_address".into(),
            CellValue::List(vec![CellValue::Map(inner)]),
        );
        let set = RecordSet::from_rows(vec![row], Format::Json);

        let out = transform_keys(&set, KeyStyle::CamelCase);
        let CellValue::List(items) = &out.rows[0]["homeAddress"] else {
            panic!("expected a list");
        };
        let CellValue::Map(m) = &items[0] else {
            panic!("expected a map");
        };
        assert!(m.contains_key("zipCode"));
    }

    #[test]
    fn test_collisions() {
        let found = find_key_collisions(&keys(&["first-name", "first_name", "age"]), KeyStyle::CamelCase);
        assert_eq!(
            found,
            vec![KeyCollision {
                target: "firstName".into(),
                sources: keys(&["first-name", "first_name"]),
            }]
        );

        let set = set_with_headers(&["first-name", "first_name"]);
        let err = transform_keys_strict(&set, KeyStyle::CamelCase).unwrap_err();
        assert!(matches!(err, TransformError::KeyCollision { .. }));
        assert!(transform_keys_strict(&set, KeyStyle::Uppercase).is_err());
        assert!(transform_keys_strict(&set_with_headers(&["a_b"]), KeyStyle::CamelCase).is_ok());
    }

    #[test]
    fn test_detect_key_style() {
        let report = detect_key_style(&keys(&["firstName", "lastName", "email_address", "age"]));
        assert_eq!(report.style, "camelCase");
        assert!((report.confidence - 0.5).abs() < f64::EPSILON);
        assert_eq!(report.counts["lowercase"], 1);

        let report = detect_key_style(&[]);
        assert_eq!(report.style, "mixed");
        assert_eq!(report.confidence, 0.0);
    }

    #[test]
    fn test_parse_style() {
        assert_eq!("snake_case".parse::<KeyStyle>().unwrap(), KeyStyle::SnakeCase);
        assert_eq!("camel".parse::<KeyStyle>().unwrap(), KeyStyle::CamelCase);
        assert!("kebab".parse::<KeyStyle>().is_err());
        let style: KeyStyle = serde_json::from_str("\"camelCase\"").unwrap();
        assert_eq!(style.to_string(), "camelCase");
    }
}
