//! Conversion pipeline.
//!
//! Runs one conversion end to end:
//!
//! 1. check the source exists
//! 2. detect its format
//! 3. look up the source and target collaborators
//! 4. read into a [`RecordSet`] and validate it
//! 5. apply the transformations in order
//! 6. validate against the target format
//! 7. write the target
//!
//! Expected failures never escape as errors: [`Converter::convert`] always
//! returns a [`ConversionOutcome`] naming the stage that failed. Writing is
//! the last step, so a failed conversion leaves no output behind.
//!
//! # Example
//!
//! ```rust,ignore
//! use tabconv::{ConversionRequest, Converter, EngineConfig, Format};
//!
//! let converter = Converter::with_defaults(EngineConfig::from_env());
//! let outcome = converter.convert(&ConversionRequest::new("people.csv", Format::Json));
//! println!("{}", outcome.message);
//! ```

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use super::columns::{self, ColumnOperation};
use super::filter::{filter_with, ExpressionPolicy, FilterCriteria};
use super::keys::{find_key_collisions, transform_keys, transform_keys_strict, KeyStyle};
use crate::api::logs::{log_error, log_info, log_info_indent, log_success, log_warning};
use crate::config::EngineConfig;
use crate::detect::{Detection, FormatDetector};
use crate::error::{FormatError, PipelineError, PipelineResult, TransformResult};
use crate::formats::{FormatRegistry, ReadOptions, WriteOptions};
use crate::models::{Format, RecordSet};
use crate::validation;

// =============================================================================
// Transformation descriptions
// =============================================================================

/// One entry of a transformation list: `{"type": ..., "parameters": ...}`.
///
/// Unknown types deserialize to [`Transformation::Unknown`] and are skipped
/// with a warning, so older engines accept newer lists.
#[derive(Debug, Clone, PartialEq)]
pub enum Transformation {
    KeyStyle { style: KeyStyle, strict: bool },
    ColumnOperation(Vec<ColumnOperation>),
    Filter(FilterCriteria),
    Unknown(String),
}

#[derive(Deserialize)]
struct RawTransformation {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    parameters: Value,
}

#[derive(Deserialize)]
struct KeyStyleParams {
    style: KeyStyle,
    #[serde(default)]
    strict: bool,
}

impl<'de> Deserialize<'de> for Transformation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawTransformation::deserialize(deserializer)?;
        let context = |e: serde_json::Error| -> D::Error {
            de::Error::custom(format!("{}: {}", raw.kind, e))
        };

        match raw.kind.as_str() {
            "keyStyle" => {
                let params = match raw.parameters.clone() {
                    Value::String(s) => KeyStyleParams {
                        style: s.parse::<KeyStyle>().map_err(<D::Error as de::Error>::custom)?,
                        strict: false,
                    },
                    other => serde_json::from_value(other).map_err(context)?,
                };
                Ok(Transformation::KeyStyle {
                    style: params.style,
                    strict: params.strict,
                })
            }
            "columnOperation" => {
                let ops = match raw.parameters.clone() {
                    Value::Null => {
                        return Err(<D::Error as de::Error>::custom(
                            "columnOperation: parameters must be an operation or a list of operations",
                        ))
                    }
                    list @ Value::Array(_) => serde_json::from_value(list).map_err(context)?,
                    single => vec![serde_json::from_value(single).map_err(context)?],
                };
                Ok(Transformation::ColumnOperation(ops))
            }
            "filter" => match raw.parameters.clone() {
                Value::Null => Ok(Transformation::Filter(FilterCriteria::default())),
                criteria => Ok(Transformation::Filter(
                    serde_json::from_value(criteria).map_err(context)?,
                )),
            },
            other => Ok(Transformation::Unknown(other.to_string())),
        }
    }
}

impl Transformation {
    /// The type tag.
    pub fn kind(&self) -> &str {
        match self {
            Transformation::KeyStyle { .. } => "keyStyle",
            Transformation::ColumnOperation(_) => "columnOperation",
            Transformation::Filter(_) => "filter",
            Transformation::Unknown(tag) => tag,
        }
    }
}

// =============================================================================
// Requests and outcomes
// =============================================================================

/// Input of one conversion.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionRequest {
    pub source_path: PathBuf,
    pub target_format: Format,
    /// Defaults to the source path with the target extension.
    #[serde(default)]
    pub output_path: Option<PathBuf>,
    #[serde(default)]
    pub transformations: Vec<Transformation>,
    #[serde(default)]
    pub read_options: ReadOptions,
    #[serde(default)]
    pub write_options: WriteOptions,
    /// Overrides the configured sniffing policy.
    #[serde(default)]
    pub content_sniff: Option<bool>,
}

impl ConversionRequest {
    pub fn new(source: impl Into<PathBuf>, target_format: Format) -> Self {
        Self {
            source_path: source.into(),
            target_format,
            output_path: None,
            transformations: Vec::new(),
            read_options: ReadOptions::default(),
            write_options: WriteOptions::default(),
            content_sniff: None,
        }
    }

    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn with_transformations(mut self, transformations: Vec<Transformation>) -> Self {
        self.transformations = transformations;
        self
    }

    /// Where the result will be written.
    pub fn resolved_output(&self) -> PathBuf {
        self.output_path
            .clone()
            .unwrap_or_else(|| default_output_path(&self.source_path, self.target_format))
    }
}

/// Source path with the target format's extension.
pub fn default_output_path(source: &Path, target: Format) -> PathBuf {
    source.with_extension(target.extension())
}

/// Result of [`Converter::convert`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    pub message: String,
    pub warnings: Vec<String>,
    /// Failing stage: request, detect, lookup, io, validate or transform.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detection: Option<Detection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<usize>,
}

impl ConversionOutcome {
    /// Outcome for an error, e.g. a request rejected before it reached [`Converter::convert`].
    pub fn failure(err: &PipelineError, detection: Option<Detection>) -> Self {
        let message = match err {
            PipelineError::Format(f) => format!("{} {}", f, f.remediation()),
            other => other.to_string(),
        };
        Self {
            success: false,
            output_path: None,
            message,
            warnings: Vec::new(),
            stage: Some(err.stage().to_string()),
            detection,
            rows: None,
            columns: None,
        }
    }
}

/// Count-based drift between the pre- and post-transformation snapshots.
pub fn drift_warnings(before: &RecordSet, after: &RecordSet) -> Vec<String> {
    let mut warnings = Vec::new();
    let (rows_before, rows_after) = (before.metadata.total_rows, after.metadata.total_rows);
    let (cols_before, cols_after) = (before.columns().len(), after.columns().len());
    // A headerless set with no rows left has no observable columns
    let columns_known = after.headers.is_some() || !after.rows.is_empty();

    if rows_after < rows_before {
        warnings.push(format!(
            "{} rows were filtered out during transformation",
            rows_before - rows_after
        ));
    }
    if !columns_known {
        return warnings;
    }
    if cols_after < cols_before {
        warnings.push(format!(
            "{} columns were removed during transformation",
            cols_before - cols_after
        ));
    } else if cols_after > cols_before {
        warnings.push(format!(
            "{} columns were added during transformation",
            cols_after - cols_before
        ));
    }
    warnings
}

// =============================================================================
// Converter
// =============================================================================

/// Runs conversions against an injected format registry.
#[derive(Debug)]
pub struct Converter {
    registry: FormatRegistry,
    detector: FormatDetector,
    config: EngineConfig,
}

struct Converted {
    output_path: PathBuf,
    set: RecordSet,
    warnings: Vec<String>,
}

impl Converter {
    pub fn new(registry: FormatRegistry, config: EngineConfig) -> Self {
        Self {
            detector: FormatDetector::new(config.sniff_bytes),
            registry,
            config,
        }
    }

    /// Converter over the bundled collaborators.
    pub fn with_defaults(config: EngineConfig) -> Self {
        Self::new(FormatRegistry::with_defaults(), config)
    }

    pub fn registry(&self) -> &FormatRegistry {
        &self.registry
    }

    pub fn detector(&self) -> &FormatDetector {
        &self.detector
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one conversion. Never panics or errors on bad input; the outcome
    /// says what happened.
    pub fn convert(&self, request: &ConversionRequest) -> ConversionOutcome {
        log_info(format!(
            "🔄 Converting {} to {}",
            request.source_path.display(),
            request.target_format
        ));

        let mut detection = None;
        match self.run(request, &mut detection) {
            Ok(done) => {
                let message = format!(
                    "Converted {} rows to {} at {}",
                    done.set.metadata.total_rows,
                    request.target_format,
                    done.output_path.display()
                );
                log_success(&message);
                ConversionOutcome {
                    success: true,
                    rows: Some(done.set.metadata.total_rows),
                    columns: Some(done.set.metadata.total_columns),
                    output_path: Some(done.output_path),
                    message,
                    warnings: done.warnings,
                    stage: None,
                    detection,
                }
            }
            Err(err) => {
                log_error(format!("{} stage failed: {}", err.stage(), err));
                ConversionOutcome::failure(&err, detection)
            }
        }
    }

    fn run(&self, request: &ConversionRequest, detection_out: &mut Option<Detection>) -> PipelineResult<Converted> {
        let source = request.source_path.as_path();
        if !source.exists() {
            return Err(FormatError::NotFound(source.to_path_buf()).into());
        }
        let output_path = request.resolved_output();
        if output_path == source {
            return Err(PipelineError::Request(format!(
                "output path {} would overwrite the source",
                output_path.display()
            )));
        }

        // Detect
        let sniff = request.content_sniff.unwrap_or(self.config.content_sniffing);
        let detection = self.detector.detect(source, sniff)?;
        log_success(format!(
            "Detected {} ({:.0}% via {:?})",
            detection.format,
            detection.confidence * 100.0,
            detection.method
        ));
        let source_format = detection.format;
        *detection_out = Some(detection);

        // Lookup
        let reader = self.registry.get(source_format)?;
        let writer = self.registry.get(request.target_format)?;

        // Read and validate
        let set = reader.read(source, &request.read_options)?;
        log_success(format!(
            "Read {} rows, {} columns",
            set.metadata.total_rows, set.metadata.total_columns
        ));
        let mut warnings = validation::validate(&set)
            .merge(reader.validate(&set))
            .into_result()?;

        // Transform
        let transformed = self.apply_transformations(&set, &request.transformations, &mut warnings)?;
        warnings.extend(drift_warnings(&set, &transformed));

        // Validate against the target, then write
        let mut target = transformed;
        target.metadata.format = request.target_format;
        warnings.extend(
            validation::validate(&target)
                .merge(writer.validate(&target))
                .into_result()?,
        );

        writer.write(&target, &output_path, &request.write_options)?;

        for w in &warnings {
            log_warning(w);
        }
        Ok(Converted {
            output_path,
            set: target,
            warnings,
        })
    }

    /// Apply each transformation to the previous result.
    pub fn apply_transformations(
        &self,
        set: &RecordSet,
        transformations: &[Transformation],
        warnings: &mut Vec<String>,
    ) -> PipelineResult<RecordSet> {
        let mut current = set.clone();
        for (i, t) in transformations.iter().enumerate() {
            let step = i + 1;
            current = self
                .apply_one(&current, t, warnings)
                .map_err(|source| PipelineError::Transform {
                    step,
                    kind: t.kind().to_string(),
                    source,
                })?;
            log_info_indent(
                format!("Step {} ({}): {} rows, {} columns", step, t.kind(), current.len(), current.metadata.total_columns),
                1,
            );
        }
        Ok(current)
    }

    fn apply_one(
        &self,
        set: &RecordSet,
        transformation: &Transformation,
        warnings: &mut Vec<String>,
    ) -> TransformResult<RecordSet> {
        match transformation {
            Transformation::KeyStyle { style, strict } => {
                if *strict || self.config.strict_keys {
                    return transform_keys_strict(set, *style);
                }
                for c in find_key_collisions(&set.columns(), *style) {
                    warnings.push(format!(
                        "Key style {} merged columns {} into '{}'",
                        style,
                        c.sources.join(", "),
                        c.target
                    ));
                }
                Ok(transform_keys(set, *style))
            }
            Transformation::ColumnOperation(ops) => {
                for op in ops {
                    log_info_indent(op.describe(), 2);
                }
                columns::apply(set, ops)
            }
            Transformation::Filter(criteria) => {
                let policy = if self.config.strict_expressions {
                    ExpressionPolicy::Strict
                } else {
                    ExpressionPolicy::FailOpen
                };
                filter_with(set, criteria, policy)
            }
            Transformation::Unknown(tag) => {
                let msg = format!("Skipped unknown transformation type '{}'", tag);
                log_warning(&msg);
                warnings.push(msg);
                Ok(set.clone())
            }
        }
    }
}
