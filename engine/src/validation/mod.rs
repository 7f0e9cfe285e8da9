//! Record set validation.
//!
//! Structural checks are format-independent:
//!
//! - the serialized record set matches the embedded JSON Schema
//!   (`schemas/record-set.json`, Draft 7): rows and headers are sequences,
//!   metadata is complete, counts are non-negative integers;
//! - declared counts match the data;
//! - header names are unique (a warning, not an error).
//!
//! Format collaborators contribute their own checks through
//! [`crate::formats::FormatHandler::validate`]; the caller merges both
//! reports with [`ValidationReport::merge`].
//!
//! # Example
//!
//! ```rust,ignore
//! use tabconv::validation::validate;
//!
//! let report = validate(&record_set);
//! if !report.is_valid {
//!     eprintln!("{}", report.errors.join("\n"));
//! }
//! ```

use jsonschema::Validator;
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::Value;

use crate::error::ValidationError;
use crate::models::RecordSet;

/// Rows with undeclared keys reported individually before summarising.
const MAX_ROW_WARNINGS: usize = 3;

static RECORD_SET_SCHEMA: Lazy<Validator> = Lazy::new(|| {
    let schema: Value = serde_json::from_str(include_str!("../../schemas/record-set.json"))
        .expect("Invalid embedded schema");
    jsonschema::draft7::new(&schema).expect("Invalid embedded schema")
});

/// Result of a validation pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.is_valid = false;
        self.errors.push(message.into());
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Fold another report (e.g. a format collaborator's) into this one.
    pub fn merge(mut self, other: ValidationReport) -> Self {
        self.is_valid &= other.is_valid;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self
    }

    /// Errors become a [`ValidationError`]; otherwise the warnings are returned.
    pub fn into_result(self) -> Result<Vec<String>, ValidationError> {
        if self.is_valid {
            Ok(self.warnings)
        } else {
            Err(ValidationError::Invalid {
                errors: self.errors,
            })
        }
    }
}

/// Validate arbitrary JSON against the record set schema.
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(Vec<String>)` with one message per violation
pub fn validate_schema(data: &Value) -> Result<(), Vec<String>> {
    let errors: Vec<String> = RECORD_SET_SCHEMA
        .iter_errors(data)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Quick structural check of raw JSON.
pub fn is_valid_json(data: &Value) -> bool {
    RECORD_SET_SCHEMA.is_valid(data)
}

/// Run the format-independent checks on a record set.
pub fn validate(set: &RecordSet) -> ValidationReport {
    let mut report = ValidationReport::new();

    match serde_json::to_value(set) {
        Ok(json) => {
            if let Err(errors) = validate_schema(&json) {
                for e in errors {
                    report.error(e);
                }
            }
        }
        Err(e) => report.error(format!("Record set is not serializable: {}", e)),
    }

    check_counts(set, &mut report);
    check_headers(set, &mut report);

    if set.is_empty() {
        report.warning("Record set has no rows");
    }

    report
}

fn check_counts(set: &RecordSet, report: &mut ValidationReport) {
    let declared = &set.metadata;
    if declared.total_rows != set.rows.len() {
        report.warning(format!(
            "Declared row count {} does not match {} rows",
            declared.total_rows,
            set.rows.len()
        ));
    }
    let actual_columns = match &set.headers {
        Some(h) => h.len(),
        None => set.rows.first().map(|r| r.len()).unwrap_or(0),
    };
    if declared.total_columns != actual_columns {
        report.warning(format!(
            "Declared column count {} does not match {} columns",
            declared.total_columns, actual_columns
        ));
    }
}

fn check_headers(set: &RecordSet, report: &mut ValidationReport) {
    let Some(headers) = &set.headers else {
        return;
    };

    for dup in set.duplicate_headers() {
        report.warning(format!("Duplicate header '{}'", dup));
    }
    if headers.iter().any(|h| h.is_empty()) {
        report.warning("Header list contains an empty column name");
    }

    let mut undeclared_rows = 0;
    for (i, row) in set.rows.iter().enumerate() {
        let extra: Vec<&str> = row
            .keys()
            .filter(|k| !headers.contains(*k))
            .map(String::as_str)
            .collect();
        if extra.is_empty() {
            continue;
        }
        undeclared_rows += 1;
        if undeclared_rows <= MAX_ROW_WARNINGS {
            report.warning(format!(
                "Row {} has columns not listed in headers: {}",
                i,
                extra.join(", ")
            ));
        }
    }
    if undeclared_rows > MAX_ROW_WARNINGS {
        report.warning(format!(
            "{} more rows have columns not listed in headers",
            undeclared_rows - MAX_ROW_WARNINGS
        ));
    }
}
