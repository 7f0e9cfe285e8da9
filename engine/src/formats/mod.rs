//! Format collaborators.
//!
//! Each concrete format implements [`FormatHandler`]: `read` turns a file
//! into a [`RecordSet`], `write` does the reverse, `validate` adds the
//! format's own rules to the structural checks. Handlers are looked up by
//! [`Format`] tag through a [`FormatRegistry`] that is built once and passed
//! into the pipeline.
//!
//! I/O failures are classified through [`FormatError::from_io`] so every
//! format reports not-found, permission, disk-full and malformed-content
//! problems the same way.

pub mod csv;
pub mod json;
pub mod markdown;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{FormatError, FormatResult};
use crate::models::{Format, RecordSet};
use crate::validation::ValidationReport;

pub use self::csv::CsvHandler;
pub use self::json::JsonHandler;
pub use self::markdown::MarkdownHandler;

// =============================================================================
// Options
// =============================================================================

/// Options for [`FormatHandler::read`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReadOptions {
    /// Source encoding; detected when absent.
    pub encoding: Option<String>,
    /// Field delimiter for delimited text; detected when absent.
    pub delimiter: Option<char>,
    /// Sheet or section to read.
    pub sheet: Option<String>,
    /// Turn numeric/boolean/empty text into typed values.
    pub infer_types: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            encoding: None,
            delimiter: None,
            sheet: None,
            infer_types: true,
        }
    }
}

/// Options for [`FormatHandler::write`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WriteOptions {
    /// Target encoding; UTF-8 when absent.
    pub encoding: Option<String>,
    /// Field delimiter for delimited text.
    pub delimiter: Option<char>,
    /// Sheet or section name to write under.
    pub sheet: Option<String>,
    /// Human-friendly layout where the format has one.
    pub pretty: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            encoding: None,
            delimiter: None,
            sheet: None,
            pretty: true,
        }
    }
}

// =============================================================================
// Collaborator contract
// =============================================================================

/// One implementation per concrete format.
pub trait FormatHandler: Send + Sync {
    /// Tag this handler is registered under.
    fn format(&self) -> Format;

    /// Read `path` into a record set.
    fn read(&self, path: &Path, options: &ReadOptions) -> FormatResult<RecordSet>;

    /// Write `set` to `path`. Implementations must not leave a partial file.
    fn write(&self, set: &RecordSet, path: &Path, options: &WriteOptions) -> FormatResult<()>;

    /// Format-specific checks, merged by the caller with the structural ones.
    fn validate(&self, _set: &RecordSet) -> ValidationReport {
        ValidationReport::new()
    }
}

/// Tag to collaborator lookup.
#[derive(Default)]
pub struct FormatRegistry {
    handlers: HashMap<Format, Box<dyn FormatHandler>>,
}

impl FormatRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the bundled CSV, JSON and markdown handlers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(CsvHandler));
        registry.register(Box::new(JsonHandler));
        registry.register(Box::new(MarkdownHandler));
        registry
    }

    /// Add or replace the handler for its format.
    pub fn register(&mut self, handler: Box<dyn FormatHandler>) {
        self.handlers.insert(handler.format(), handler);
    }

    pub fn get(&self, format: Format) -> FormatResult<&dyn FormatHandler> {
        self.handlers
            .get(&format)
            .map(|h| h.as_ref())
            .ok_or(FormatError::Unsupported(format))
    }

    pub fn supports(&self, format: Format) -> bool {
        self.handlers.contains_key(&format)
    }

    /// Registered formats in a stable order.
    pub fn formats(&self) -> Vec<Format> {
        Format::ALL
            .into_iter()
            .filter(|f| self.handlers.contains_key(f))
            .collect()
    }
}

impl std::fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatRegistry")
            .field("formats", &self.formats())
            .finish()
    }
}

// =============================================================================
// Shared I/O helpers
// =============================================================================

/// Read a whole file, classifying failures.
pub(crate) fn read_file(path: &Path) -> FormatResult<Vec<u8>> {
    fs::read(path).map_err(|e| FormatError::from_io(path, e))
}

/// Write `bytes` to `path` through a sibling temp file and a rename, so a
/// failure never leaves a truncated target behind.
pub(crate) fn write_file(path: &Path, bytes: &[u8]) -> FormatResult<()> {
    let tmp = temp_sibling(path);
    if let Err(e) = fs::write(&tmp, bytes) {
        let _ = fs::remove_file(&tmp);
        return Err(FormatError::from_io(path, e));
    }
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        FormatError::from_io(path, e)
    })
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    path.with_file_name(format!(".{}.tmp", name))
}

/// Decode UTF-8 text for formats that require it, dropping a leading BOM.
pub(crate) fn utf8_text(path: &Path, bytes: Vec<u8>) -> FormatResult<String> {
    let text = String::from_utf8(bytes)
        .map_err(|e| FormatError::malformed(path, format!("invalid UTF-8: {}", e)))?;
    Ok(match text.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_registry_lookup() {
        let registry = FormatRegistry::with_defaults();
        assert_eq!(registry.formats(), vec![Format::Csv, Format::Json, Format::Markdown]);
        assert!(registry.get(Format::Json).is_ok());
        assert!(matches!(
            registry.get(Format::Xml),
            Err(FormatError::Unsupported(Format::Xml))
        ));
    }

    #[test]
    fn test_empty_registry() {
        let registry = FormatRegistry::new();
        assert!(!registry.supports(Format::Csv));
        assert!(registry.formats().is_empty());
    }

    #[test]
    fn test_write_file_leaves_no_temp() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.csv");
        write_file(&target, b"a,b\n").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"a,b\n");
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_write_into_missing_directory_is_not_found() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("missing").join("out.csv");
        let err = write_file(&target, b"x").unwrap_err();
        assert!(matches!(err, FormatError::NotFound(_)));
    }

    #[test]
    fn test_read_missing_file() {
        let err = read_file(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, FormatError::NotFound(_)));
        assert!(err.remediation().contains("path"));
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let opts: ReadOptions = serde_json::from_str(r#"{"delimiter": ";"}"#).unwrap();
        assert_eq!(opts.delimiter, Some(';'));
        assert!(opts.infer_types);
        let opts: WriteOptions = serde_json::from_str("{}").unwrap();
        assert!(opts.pretty);
    }
}
