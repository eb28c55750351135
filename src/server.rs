//! HTTP API over the calibration service.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/process_files` | Ingest the configured calibration directory |
//! | `GET`, `POST` | `/api/query` | Look up records by key |
//! | `GET`  | `/api/health` | Health check (returns version) |
//! | `GET`  | `/api/get_content?filename=X` | Raw file content |
//! | `GET`  | `/api/calibration_files` | Registered files with decoded metadata |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "not found: calibration file X.txt" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `file_read_error` (500),
//! `storage_error` (500).

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::error::CalibrationError;
use crate::models::{FileSummary, IngestSummary};
use crate::service::{CalibrationService, Health, QueryResult, ServiceSettings};
use crate::store::SqliteStore;

/// Opens the configured store and serves the API until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store = SqliteStore::open(config).await?;
    let service = CalibrationService::new(Arc::new(store), ServiceSettings::from_config(config));

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "calibration API listening");
    println!("Calibration API listening on http://{}", config.server.bind);

    axum::serve(listener, router(service)).await?;
    Ok(())
}

/// Builds the API router around an existing service.
pub fn router(service: CalibrationService) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/process_files", post(handle_process_files))
        .route("/api/query", get(handle_query).post(handle_query))
        .route("/api/health", get(handle_health))
        .route("/api/get_content", get(handle_get_content))
        .route("/api/calibration_files", get(handle_calibration_files))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(service))
}

type AppState = State<Arc<CalibrationService>>;

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

#[derive(Debug)]
struct AppError(CalibrationError);

impl From<CalibrationError> for AppError {
    fn from(err: CalibrationError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            CalibrationError::Validation(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            CalibrationError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            CalibrationError::FileRead { .. } | CalibrationError::Directory { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "file_read_error")
            }
            CalibrationError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
        };
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code,
                message: self.0.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Malformed query strings get the JSON contract instead of axum's plain text.
impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError(CalibrationError::Validation(message.into()))
}

// ============ POST /api/process_files ============

async fn handle_process_files(State(service): AppState) -> Result<Json<IngestSummary>, AppError> {
    let summary = service.process_configured_directory().await?;
    Ok(Json(summary))
}

// ============ GET|POST /api/query ============

#[derive(Deserialize)]
struct QueryParams {
    /// Comma-separated keys.
    keys: Option<String>,
}

/// Accepted JSON bodies: `{"keys": [...]}` or a bare array.
#[derive(Deserialize)]
#[serde(untagged)]
enum KeysBody {
    Object { keys: Vec<String> },
    List(Vec<String>),
}

impl KeysBody {
    fn into_keys(self) -> Vec<String> {
        match self {
            KeysBody::Object { keys } | KeysBody::List(keys) => keys,
        }
    }
}

fn request_keys(params: QueryParams, body: &[u8]) -> Result<Vec<String>, AppError> {
    let mut keys: Vec<String> = params
        .keys
        .as_deref()
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if !body.iter().all(u8::is_ascii_whitespace) {
        let parsed: KeysBody = serde_json::from_slice(body).map_err(|e| {
            bad_request(format!(
                "body must be {{\"keys\": [string]}} or [string]: {}",
                e
            ))
        })?;
        keys.extend(parsed.into_keys());
    }

    if keys.is_empty() {
        return Err(bad_request("keys must not be empty"));
    }
    if keys.iter().any(|k| k.is_empty()) {
        return Err(bad_request("keys must not contain empty strings"));
    }
    Ok(keys)
}

async fn handle_query(
    State(service): AppState,
    params: Result<Query<QueryParams>, QueryRejection>,
    body: Bytes,
) -> Result<Json<QueryResult>, AppError> {
    let Query(params) = params?;
    let keys = request_keys(params, &body)?;
    let result = service.query(&keys).await?;
    Ok(Json(result))
}

// ============ GET /api/health ============

async fn handle_health(State(service): AppState) -> Result<Json<Health>, AppError> {
    Ok(Json(service.health().await?))
}

// ============ GET /api/get_content ============

#[derive(Deserialize)]
struct ContentParams {
    filename: Option<String>,
}

async fn handle_get_content(
    State(service): AppState,
    params: Result<Query<ContentParams>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(params) = params?;
    let filename = params
        .filename
        .ok_or_else(|| bad_request("filename parameter is required"))?;
    let content = service.get_content(&filename).await?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        content,
    )
        .into_response())
}

// ============ GET /api/calibration_files ============

#[derive(Serialize)]
struct CalibrationFilesResponse {
    calibration_files: Vec<FileSummary>,
    count: usize,
}

async fn handle_calibration_files(
    State(service): AppState,
) -> Result<Json<CalibrationFilesResponse>, AppError> {
    let calibration_files = service.list_calibration_files().await?;
    Ok(Json(CalibrationFilesResponse {
        count: calibration_files.len(),
        calibration_files,
    }))
}
