//! # tabconv - tabular data conversion engine
//!
//! tabconv detects the format of a tabular file, reads it into one canonical
//! in-memory model, applies an ordered list of transformations (key-style
//! normalisation, column operations, row filters) and writes the result in
//! another format.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Source file │────▶│   Detect    │────▶│  Read and   │────▶│  Transform  │
//! │ (any format)│     │ (ext + sniff)│    │  validate   │     │ (ordered)   │
//! └─────────────┘     └─────────────┘     └─────────────┘     └──────┬──────┘
//!                                                                    │
//!                     ┌─────────────┐     ┌─────────────┐            │
//!                     │ Target file │◀────│  Validate   │◀───────────┘
//!                     │             │     │ and write   │
//!                     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tabconv::{ConversionRequest, Converter, EngineConfig, Format};
//!
//! let converter = Converter::with_defaults(EngineConfig::from_env());
//! let outcome = converter.convert(&ConversionRequest::new("people.csv", Format::Json));
//! assert!(outcome.success, "{}", outcome.message);
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`config`] - Environment-driven configuration
//! - [`models`] - Record set, cell values, metadata, column statistics
//! - [`detect`] - Format detection (extension and content)
//! - [`validation`] - Structural validation reports
//! - [`formats`] - Format collaborators and their registry
//! - [`transform`] - Key styles, column operations, filters and the pipeline
//! - [`api`] - HTTP API server and log stream

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Detection and validation
pub mod detect;
pub mod validation;

// Format collaborators
pub mod formats;

// Transformation
pub mod transform;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    DetectionError, FormatError, PipelineError, PipelineResult, ServerError, TransformError,
    TransformResult, ValidationError,
};

// =============================================================================
// Re-exports - Models and configuration
// =============================================================================

pub use config::EngineConfig;
pub use models::{column_stats, CellValue, ColumnStats, Format, Metadata, RecordSet, Row};

// =============================================================================
// Re-exports - Detection, validation, formats
// =============================================================================

pub use detect::{Detection, DetectionMethod, FormatDetector};
pub use formats::{FormatHandler, FormatRegistry, ReadOptions, WriteOptions};
pub use validation::{validate, ValidationReport};

// =============================================================================
// Re-exports - Transformations
// =============================================================================

pub use transform::{
    apply_column_operations, detect_key_style, filter, find_key_collisions, operations_description,
    transform_keys, transform_keys_strict, validate_operations, ColumnDefault, ColumnFilter,
    ColumnOperation, DateRange, FilterCriteria, FilterOperator, KeyCollision, KeyStyle,
    KeyStyleReport, ValueOperation,
};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::pipeline::{ConversionOutcome, ConversionRequest, Converter, Transformation};

// =============================================================================
// Re-exports - API
// =============================================================================

pub use api::types::{error_response, ConvertResponse, DetectRequest};

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
