//! HTTP API for regulation analysis.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/analyze` | Run the full analysis pipeline for one regulation |
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/ready` | Readiness: index openable and non-empty |
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "invalid_input", "message": "regulation text too short" } }
//! ```
//!
//! Error codes: `invalid_input` (400), `service_unavailable` (503),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::error::PipelineError;
use crate::models::Report;
use crate::pipeline::{AnalysisRequest, Analyzer};

/// Shared application state passed to all route handlers via Axum's
/// `State` extractor.
#[derive(Clone)]
struct AppState {
    analyzer: Arc<Analyzer>,
}

/// Starts the analysis HTTP server.
///
/// Binds to the address configured in `[server].bind` and runs until the
/// process is terminated. The analyzer is shared across requests; the
/// underlying index is read-only while serving.
pub async fn run_server(config: &Config, analyzer: Arc<Analyzer>) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let app = build_router(analyzer);

    println!("Analysis server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Assemble the application router with all routes and CORS.
///
/// Separated from [`run_server`] so the routing and error contract can be
/// exercised in-process without binding a socket.
pub fn build_router(analyzer: Arc<Analyzer>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/analyze", post(handle_analyze))
        .route("/health", get(handle_health))
        .route("/ready", get(handle_ready))
        .layer(cors)
        .with_state(AppState { analyzer })
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"invalid_input"`).
    code: String,
    /// Human-readable error message.
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

/// Map pipeline errors onto the HTTP error contract.
///
/// `SchemaViolation` indicates an internal bug, not a client mistake, so
/// it maps to `internal` alongside storage failures.
fn map_pipeline_error(err: PipelineError) -> AppError {
    let (status, code) = match &err {
        PipelineError::InvalidQuery(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
        PipelineError::IndexUnavailable(_) | PipelineError::UpstreamUnavailable(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
        }
        PipelineError::SchemaViolation(_)
        | PipelineError::Storage(_)
        | PipelineError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    };
    AppError {
        status,
        code: code.to_string(),
        message: err.to_string(),
    }
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    /// The crate version from `Cargo.toml`.
    version: String,
}

/// Handler for `GET /health`.
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /ready ============

/// JSON response body for `GET /ready`.
#[derive(Serialize)]
struct ReadyResponse {
    ready: bool,
}

/// Handler for `GET /ready`.
///
/// Reports whether the analyzer can serve requests: the index must be
/// reachable and contain at least one entry. Returns 503 when not ready so
/// orchestrators can gate traffic on it.
async fn handle_ready(State(state): State<AppState>) -> Response {
    let ready = state.analyzer.is_ready().await;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(ReadyResponse { ready })).into_response()
}

// ============ POST /analyze ============

/// JSON request body for `POST /analyze`.
#[derive(Deserialize)]
struct AnalyzeBody {
    new_regulation_text: String,
    #[serde(default)]
    date_of_law: Option<String>,
    #[serde(default)]
    regulation_title: Option<String>,
}

/// Handler for `POST /analyze`.
///
/// Runs the full pipeline and returns the report JSON. The report is also
/// persisted to the reports directory; a persistence failure does not fail
/// the request.
async fn handle_analyze(
    State(state): State<AppState>,
    Json(body): Json<AnalyzeBody>,
) -> Result<Json<Report>, AppError> {
    let request = AnalysisRequest {
        regulation_text: body.new_regulation_text,
        date_of_law: body.date_of_law,
        regulation_title: body.regulation_title,
    };

    let outcome = state
        .analyzer
        .analyze(&request, None, true)
        .await
        .map_err(map_pipeline_error)?;

    Ok(Json(outcome.report))
}
