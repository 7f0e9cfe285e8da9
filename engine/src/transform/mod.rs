//! Transformation module.
//!
//! - [`keys`]: key style renaming and collision checks
//! - [`columns`]: column operations (add, remove, rename, select, reorder,
//!   transform, split, merge)
//! - [`values`]: per-cell value operations used by `transform`
//! - [`filter`]: row filtering, backed by [`compare`] and [`expression`]
//! - [`pipeline`]: the conversion pipeline tying detection, collaborators
//!   and transformations together

pub mod columns;
pub mod compare;
pub mod expression;
pub mod filter;
pub mod keys;
pub mod pipeline;
pub mod values;

pub use columns::{apply as apply_column_operations, validate_operations, ColumnDefault, ColumnOperation};
pub use filter::{filter, filter_with, ColumnFilter, DateRange, ExpressionPolicy, FilterCriteria, FilterOperator};
pub use keys::{
    detect_key_style, find_key_collisions, transform_keys, transform_keys_strict, KeyCollision,
    KeyStyle, KeyStyleReport,
};
pub use pipeline::{ConversionOutcome, ConversionRequest, Converter, Transformation};
pub use values::{operations_description, ValueOperation};
