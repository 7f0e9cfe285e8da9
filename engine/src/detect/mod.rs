//! Format detection.
//!
//! Two classifiers vote on the format of an input:
//!
//! - the extension classifier maps known suffixes to a format at a fixed
//!   confidence;
//! - the content classifier reads a bounded prefix of the file and scores
//!   format signatures.
//!
//! Their results are combined into one [`Detection`]. Agreement raises the
//! confidence, disagreement keeps the stronger guess and records the other
//! one as an alternative.
//!
//! # Example
//!
//! ```rust,ignore
//! use tabconv::detect::FormatDetector;
//!
//! let detection = FormatDetector::default().detect("export.txt".as_ref(), true)?;
//! println!("{} ({:.0}%)", detection.format, detection.confidence * 100.0);
//! ```

mod content;

use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::api::logs::log_warning;
use crate::config::DEFAULT_SNIFF_BYTES;
use crate::error::{DetectionError, DetectionResult};
use crate::models::Format;

pub use content::{sniff, ContentMatch};

/// Confidence attached to every extension match.
pub const EXTENSION_CONFIDENCE: f64 = 0.8;

/// Multiplier applied to the extension guess when sniffing failed.
const SNIFF_FAILURE_PENALTY: f64 = 0.75;

/// Confidence given to a losing classifier recorded as an alternative.
const ALTERNATIVE_PENALTY: f64 = 0.5;

/// Extensions that are recognised but have no format behind them.
const UNSUPPORTED_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "ods", "odt", "parquet", "avro", "yaml", "yml", "ppt", "pptx",
];

/// How a format was identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    Extension,
    Content,
    Hybrid,
}

/// A losing guess kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alternative {
    pub format: Format,
    pub confidence: f64,
}

/// Result of [`FormatDetector::detect`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub format: Format,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub method: DetectionMethod,
    /// Human-readable explanation.
    pub details: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<Alternative>,
}

/// Outcome of the extension classifier.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtensionMatch {
    Known(Format, &'static str),
    Unsupported(String),
    Unknown,
}

/// Combines extension and content classifiers.
#[derive(Debug, Clone)]
pub struct FormatDetector {
    sniff_bytes: usize,
}

impl Default for FormatDetector {
    fn default() -> Self {
        Self::new(DEFAULT_SNIFF_BYTES)
    }
}

impl FormatDetector {
    pub fn new(sniff_bytes: usize) -> Self {
        Self { sniff_bytes }
    }

    /// Identify the format of `path`.
    ///
    /// Content is sniffed only when `allow_content_sniff` is set and the
    /// file can be opened.
    pub fn detect(&self, path: &Path, allow_content_sniff: bool) -> DetectionResult<Detection> {
        let by_extension = match classify_extension(path) {
            ExtensionMatch::Unsupported(ext) => {
                return Err(DetectionError::UnsupportedExtension(ext));
            }
            ExtensionMatch::Known(format, ext) => Some((format, ext)),
            ExtensionMatch::Unknown => None,
        };

        if !allow_content_sniff {
            return by_extension
                .map(|(format, ext)| extension_only(format, ext))
                .ok_or_else(|| DetectionError::Undetermined(path.to_path_buf()));
        }

        let prefix = match self.read_prefix(path) {
            Ok(p) => p,
            Err(err) => {
                log_warning(format!("Content sniffing failed for {}: {}", path.display(), err));
                return match by_extension {
                    Some((format, ext)) => Ok(Detection {
                        format,
                        confidence: EXTENSION_CONFIDENCE * SNIFF_FAILURE_PENALTY,
                        method: DetectionMethod::Extension,
                        details: format!(
                            "Matched '.{}' extension; content sniffing failed: {}",
                            ext, err
                        ),
                        alternatives: Vec::new(),
                    }),
                    None => Err(DetectionError::Undetermined(path.to_path_buf())),
                };
            }
        };

        let truncated = prefix.len() >= self.sniff_bytes;
        let by_content = sniff(&prefix, truncated);

        match (by_extension, by_content) {
            (None, None) => Err(DetectionError::Undetermined(path.to_path_buf())),
            (Some((format, ext)), None) => {
                let mut detection = extension_only(format, ext);
                detection.details.push_str("; content inconclusive");
                Ok(detection)
            }
            (None, Some(content)) => Ok(Detection {
                format: content.format,
                confidence: content.confidence,
                method: DetectionMethod::Content,
                details: content.signature,
                alternatives: Vec::new(),
            }),
            (Some((format, ext)), Some(content)) => Ok(combine(format, ext, content)),
        }
    }

    fn read_prefix(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        let file = File::open(path)?;
        let mut buf = Vec::with_capacity(self.sniff_bytes);
        file.take(self.sniff_bytes as u64).read_to_end(&mut buf)?;
        Ok(buf)
    }
}

/// Map the suffix of `path` to a format.
pub fn classify_extension(path: &Path) -> ExtensionMatch {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return ExtensionMatch::Unknown;
    };
    let lower = ext.to_lowercase();
    match lower.as_str() {
        "csv" => ExtensionMatch::Known(Format::Csv, "csv"),
        "tsv" => ExtensionMatch::Known(Format::Csv, "tsv"),
        "json" => ExtensionMatch::Known(Format::Json, "json"),
        "xml" => ExtensionMatch::Known(Format::Xml, "xml"),
        "md" => ExtensionMatch::Known(Format::Markdown, "md"),
        "markdown" => ExtensionMatch::Known(Format::Markdown, "markdown"),
        "xlsx" => ExtensionMatch::Known(Format::Excel, "xlsx"),
        "xls" => ExtensionMatch::Known(Format::Excel, "xls"),
        other if UNSUPPORTED_EXTENSIONS.contains(&other) => ExtensionMatch::Unsupported(lower),
        _ => ExtensionMatch::Unknown,
    }
}

fn extension_only(format: Format, ext: &str) -> Detection {
    Detection {
        format,
        confidence: EXTENSION_CONFIDENCE,
        method: DetectionMethod::Extension,
        details: format!("Matched '.{}' extension", ext),
        alternatives: Vec::new(),
    }
}

/// Merge the two classifier results.
fn combine(ext_format: Format, ext: &str, content: ContentMatch) -> Detection {
    if ext_format == content.format {
        // Independent evidence: 1 - (1 - a)(1 - b)
        let confidence =
            (1.0 - (1.0 - EXTENSION_CONFIDENCE) * (1.0 - content.confidence)).min(0.99);
        return Detection {
            format: ext_format,
            confidence,
            method: DetectionMethod::Hybrid,
            details: format!("'.{}' extension confirmed by {}", ext, content.signature),
            alternatives: Vec::new(),
        };
    }

    // Ties go to the content, which looked at the actual bytes
    if content.confidence >= EXTENSION_CONFIDENCE {
        Detection {
            format: content.format,
            confidence: content.confidence,
            method: DetectionMethod::Hybrid,
            details: format!("{} overrides '.{}' extension", content.signature, ext),
            alternatives: vec![Alternative {
                format: ext_format,
                confidence: EXTENSION_CONFIDENCE * ALTERNATIVE_PENALTY,
            }],
        }
    } else {
        Detection {
            format: ext_format,
            confidence: EXTENSION_CONFIDENCE,
            method: DetectionMethod::Hybrid,
            details: format!("'.{}' extension preferred over {}", ext, content.signature),
            alternatives: vec![Alternative {
                format: content.format,
                confidence: content.confidence * ALTERNATIVE_PENALTY,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_txt_with_json_content() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "data.txt", br#"{"a":1}"#);
        let detection = FormatDetector::default().detect(&path, true).unwrap();
        assert_eq!(detection.format, Format::Json);
        assert_ne!(detection.method, DetectionMethod::Extension);
        assert!(detection.confidence > EXTENSION_CONFIDENCE);
    }

    #[test]
    fn test_agreement_boosts_confidence() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "people.csv", b"name,age\nJohn,30\nJane,25\n");
        let detection = FormatDetector::default().detect(&path, true).unwrap();
        assert_eq!(detection.format, Format::Csv);
        assert_eq!(detection.method, DetectionMethod::Hybrid);
        assert!(detection.confidence > EXTENSION_CONFIDENCE);
    }

    #[test]
    fn test_disagreement_records_alternative() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "mislabeled.csv", b"<?xml version=\"1.0\"?>\n<rows><row/></rows>");
        let detection = FormatDetector::default().detect(&path, true).unwrap();
        assert_eq!(detection.format, Format::Xml);
        assert_eq!(detection.alternatives.len(), 1);
        assert_eq!(detection.alternatives[0].format, Format::Csv);
        assert!(detection.alternatives[0].confidence < detection.confidence);
    }

    #[test]
    fn test_weak_content_keeps_extension() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "mislabeled.json", b"a,b\n1,2\n");
        let detection = FormatDetector::default().detect(&path, true).unwrap();
        assert_eq!(detection.format, Format::Json);
        assert_eq!(detection.method, DetectionMethod::Hybrid);
        assert_eq!(detection.confidence, EXTENSION_CONFIDENCE);
        assert!(detection.details.contains("extension preferred"));
        assert_eq!(detection.alternatives.len(), 1);
        assert_eq!(detection.alternatives[0].format, Format::Csv);
        assert!(detection.alternatives[0].confidence < detection.confidence);
    }

    #[test]
    fn test_extension_only_when_sniffing_disabled() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "data.json", b"not json at all");
        let detection = FormatDetector::default().detect(&path, false).unwrap();
        assert_eq!(detection.format, Format::Json);
        assert_eq!(detection.method, DetectionMethod::Extension);
        assert_eq!(detection.confidence, EXTENSION_CONFIDENCE);
    }

    #[test]
    fn test_missing_file_falls_back_to_extension() {
        let detection = FormatDetector::default()
            .detect(Path::new("/nonexistent/dir/table.md"), true)
            .unwrap();
        assert_eq!(detection.format, Format::Markdown);
        assert!(detection.confidence < EXTENSION_CONFIDENCE);
        assert!(detection.details.contains("sniffing failed"));
    }

    #[test]
    fn test_no_extension_no_sniff_fails() {
        let err = FormatDetector::default()
            .detect(Path::new("/tmp/README"), false)
            .unwrap_err();
        assert!(matches!(err, DetectionError::Undetermined(_)));
    }

    #[test]
    fn test_unsupported_extension_fails() {
        let err = FormatDetector::default()
            .detect(Path::new("report.PDF"), true)
            .unwrap_err();
        assert!(matches!(err, DetectionError::UnsupportedExtension(ref e) if e == "pdf"));
    }

    #[test]
    fn test_bounded_prefix_still_detects_truncated_json() {
        let dir = TempDir::new().unwrap();
        let mut body = String::from("[");
        for i in 0..200 {
            body.push_str(&format!("{{\"id\":{},\"name\":\"row {}\"}},", i, i));
        }
        body.push_str("{\"id\":-1}]");
        let path = write(&dir, "big", body.as_bytes());
        let detection = FormatDetector::new(256).detect(&path, true).unwrap();
        assert_eq!(detection.format, Format::Json);
        assert_eq!(detection.method, DetectionMethod::Content);
    }
}
