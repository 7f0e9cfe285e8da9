//! Error types for the tabconv conversion pipeline.
//!
//! This module defines one error type per concern:
//!
//! - [`DetectionError`] - No confident format could be determined
//! - [`FormatError`] - Format collaborator read/write failures, classified
//! - [`TransformError`] - An invalid key-style, column or filter operation
//! - [`ValidationError`] - Structural or content rules violated
//! - [`PipelineError`] - Top-level orchestration errors, tagged by stage
//! - [`ServerError`] - HTTP layer errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::Format;

// =============================================================================
// Format Detection Errors
// =============================================================================

/// Errors while identifying the format of an input.
#[derive(Debug, Error)]
pub enum DetectionError {
    /// Neither the extension nor the content gave a result.
    #[error("Could not determine the format of '{}'", .0.display())]
    Undetermined(PathBuf),

    /// The extension is known, but no format supports it.
    #[error("Files with the '.{0}' extension are not supported")]
    UnsupportedExtension(String),
}

// =============================================================================
// Format Collaborator Errors
// =============================================================================

/// Errors raised by format collaborators.
///
/// I/O failures are classified so that every format produces the same
/// diagnostics.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The file does not exist.
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The file exists but cannot be read or written.
    #[error("Permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    /// No space left while writing.
    #[error("Disk full while writing {}", .0.display())]
    DiskFull(PathBuf),

    /// Content does not follow the format.
    #[error("Malformed content in {}: {message}", .path.display())]
    Malformed { path: PathBuf, message: String },

    /// Out-of-memory class failure. Not retryable.
    #[error("Resource exhausted: {0}")]
    Resource(String),

    /// No collaborator handles this format.
    #[error("No handler registered for format '{0}'")]
    Unsupported(Format),

    /// Any other I/O failure.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FormatError {
    /// Classify an I/O error raised while touching `path`.
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        let path = path.to_path_buf();
        match err.kind() {
            io::ErrorKind::NotFound => FormatError::NotFound(path),
            io::ErrorKind::PermissionDenied => FormatError::PermissionDenied(path),
            io::ErrorKind::StorageFull => FormatError::DiskFull(path),
            io::ErrorKind::OutOfMemory => FormatError::Resource(err.to_string()),
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => FormatError::Malformed {
                path,
                message: err.to_string(),
            },
            _ => FormatError::Io { path, source: err },
        }
    }

    pub fn malformed(path: &Path, message: impl Into<String>) -> Self {
        FormatError::Malformed {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    /// Plain-language next step for the user.
    pub fn remediation(&self) -> &'static str {
        match self {
            FormatError::NotFound(_) => "Check the path and that the file exists.",
            FormatError::PermissionDenied(_) => "Check file permissions or choose another location.",
            FormatError::DiskFull(_) => "Free some disk space or write to another volume.",
            FormatError::Malformed { .. } => "Fix the file content or pick the correct source format.",
            FormatError::Resource(_) => "The input is too large to convert in memory.",
            FormatError::Unsupported(_) => "Choose one of the registered formats.",
            FormatError::Io { .. } => "Retry once the underlying I/O problem is resolved.",
        }
    }
}

// =============================================================================
// Transformation Errors
// =============================================================================

/// Errors from key-style, column and filter operations.
#[derive(Debug, Error)]
pub enum TransformError {
    /// Target column already exists.
    #[error("Column '{0}' already exists")]
    ColumnExists(String),

    /// Referenced column is missing.
    #[error("Column '{0}' does not exist")]
    ColumnNotFound(String),

    /// Operation parameters are invalid.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Filter criteria are invalid.
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Strict key-style transform found distinct keys with one target.
    #[error("Key collision: {sources:?} all map to '{target}'")]
    KeyCollision { target: String, sources: Vec<String> },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Validation Errors
// =============================================================================

/// Errors during record set validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Schema validation failed.
    #[error("Schema validation failed: {}", .errors.join("; "))]
    Schema { errors: Vec<String> },

    /// Structural or format rules failed.
    #[error("Validation failed: {}", .errors.join("; "))]
    Invalid { errors: Vec<String> },
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline errors.
///
/// The orchestrator catches each of these once and turns it into a
/// [`crate::ConversionOutcome`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The conversion request itself is unusable.
    #[error("Invalid request: {0}")]
    Request(String),

    /// Format detection failed.
    #[error("Format detection failed: {0}")]
    Detection(#[from] DetectionError),

    /// A collaborator failed to read or write.
    #[error("{0}")]
    Format(#[from] FormatError),

    /// Source or target validation failed.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// A transformation step failed.
    #[error("Transformation failed at step {step} ({kind}): {source}")]
    Transform {
        step: usize,
        kind: String,
        #[source]
        source: TransformError,
    },
}

impl PipelineError {
    /// Name of the stage that raised the error.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Request(_) => "request",
            PipelineError::Detection(_) => "detect",
            PipelineError::Format(FormatError::Unsupported(_)) => "lookup",
            PipelineError::Format(_) => "io",
            PipelineError::Validation(_) => "validate",
            PipelineError::Transform { .. } => "transform",
        }
    }
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Could not bind or serve.
    #[error("Server I/O error: {0}")]
    Io(#[from] io::Error),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for detection.
pub type DetectionResult<T> = Result<T, DetectionError>;

/// Result type for format collaborators.
pub type FormatResult<T> = Result<T, FormatError>;

/// Result type for transformation operations.
pub type TransformResult<T> = Result<T, TransformError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
