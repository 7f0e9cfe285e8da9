//! REST API types.
//!
//! Conversion requests reuse [`ConversionRequest`] as the body, so the HTTP
//! surface and the library accept exactly the same JSON.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::transform::pipeline::{ConversionOutcome, ConversionRequest};

/// Response to `POST /api/convert`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertResponse {
    /// Unique job identifier, also used in log lines.
    pub job_id: String,
    pub outcome: ConversionOutcome,
}

impl ConvertResponse {
    pub fn new(outcome: ConversionOutcome) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            outcome,
        }
    }
}

/// Body of `POST /api/detect`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectRequest {
    pub path: String,
    #[serde(default)]
    pub content_sniff: Option<bool>,
}

/// Parse a convert body. Malformed bodies become a failed outcome instead
/// of a transport error, like any other rejected request.
pub fn parse_convert_request(body: Value) -> Result<ConversionRequest, ConversionOutcome> {
    serde_json::from_value(body).map_err(|e| {
        ConversionOutcome::failure(&PipelineError::Request(e.to_string()), None)
    })
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
    })
}
