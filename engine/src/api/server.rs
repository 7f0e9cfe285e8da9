//! HTTP server for the tabconv API.
//!
//! # API Endpoints
//!
//! | Method | Path           | Description                          |
//! |--------|----------------|--------------------------------------|
//! | GET    | `/health`      | Health check                         |
//! | POST   | `/api/convert` | Run one conversion                   |
//! | POST   | `/api/detect`  | Detect the format of a file          |
//! | GET    | `/api/logs`    | SSE stream for real-time logs        |
//!
//! Conversions are synchronous and run on the blocking pool; the async side
//! only waits for them.

use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::{convert::Infallible, net::SocketAddr, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_info, LOG_BROADCASTER};
use super::types::{error_response, parse_convert_request, ConvertResponse, DetectRequest};
use crate::detect::Detection;
use crate::error::{ServerError, ServerResult};
use crate::transform::pipeline::Converter;

type ApiError = (StatusCode, Json<Value>);

/// Build the router around a shared converter.
pub fn router(converter: Arc<Converter>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/convert", post(convert))
        .route("/api/detect", post(detect))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(converter)
}

/// Start the HTTP server
pub async fn start_server(converter: Converter, port: u16) -> ServerResult<()> {
    let formats: Vec<String> = converter
        .registry()
        .formats()
        .iter()
        .map(|f| f.to_string())
        .collect();
    let app = router(Arc::new(converter));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 tabconv server running on http://localhost:{}", port);
    println!("   POST /api/convert - Convert a file");
    println!("   POST /api/detect  - Detect a file's format");
    println!("   GET  /api/logs    - SSE log stream");
    println!("   GET  /health      - Health check");
    println!();
    println!("📝 Registered formats: {}", formats.join(", "));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health(State(converter): State<Arc<Converter>>) -> Json<Value> {
    let formats: Vec<String> = converter
        .registry()
        .formats()
        .iter()
        .map(|f| f.to_string())
        .collect();
    Json(json!({
        "status": "ok",
        "service": "tabconv",
        "version": env!("CARGO_PKG_VERSION"),
        "formats": formats,
        "endpoints": {
            "convert": "POST /api/convert",
            "detect": "POST /api/detect",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn internal(err: ServerError) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(error_response(&err.to_string())),
    )
}

/// Conversion endpoint
async fn convert(
    State(converter): State<Arc<Converter>>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<ConvertResponse>), ApiError> {
    let request = match parse_convert_request(body) {
        Ok(r) => r,
        Err(outcome) => {
            return Ok((StatusCode::BAD_REQUEST, Json(ConvertResponse::new(outcome))));
        }
    };

    let outcome = tokio::task::spawn_blocking(move || converter.convert(&request))
        .await
        .map_err(|e| internal(ServerError::Internal(e.to_string())))?;

    let response = ConvertResponse::new(outcome);
    log_info(format!(
        "Job {} finished: {}",
        response.job_id, response.outcome.message
    ));
    let status = if response.outcome.success {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    Ok((status, Json(response)))
}

/// Detection endpoint
async fn detect(
    State(converter): State<Arc<Converter>>,
    Json(body): Json<DetectRequest>,
) -> Result<Json<Detection>, ApiError> {
    let sniff = body
        .content_sniff
        .unwrap_or(converter.config().content_sniffing);
    let path = PathBuf::from(&body.path);

    let result = tokio::task::spawn_blocking(move || converter.detector().detect(&path, sniff))
        .await
        .map_err(|e| internal(ServerError::Internal(e.to_string())))?;

    result.map(Json).map_err(|e| {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(error_response(&ServerError::BadRequest(e.to_string()).to_string())),
        )
    })
}
