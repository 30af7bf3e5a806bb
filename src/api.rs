//! HTTP API for the F29 engine.
//!
//! This module exposes a small REST API around the resolution engine
//! using the [`axum`](https://crates.io/crates/axum) framework.  Clients
//! submit input documents as JSON and receive the resolved code map,
//! optionally with the printable report.  The tax rules are loaded once
//! at start-up and shared read-only by every request.

use crate::engine::{resolve, resolve_batch};
use crate::error::ResolveError;
use crate::form::{self, FormSection, LineSource};
use crate::models::{CodeMap, InputDocument};
use crate::report::{build_report, Report};
use crate::tax::TaxRules;
use anyhow::Context;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;

/// Application state shared across requests.
pub struct AppState {
    pub rules: TaxRules,
}

/// Errors returned by the handlers.  Every variant renders as
/// `{"error": {"code": <status>, "message": ...}}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("invalid request body: {0}")]
    Body(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Body(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Resolve(_) | ApiError::Body(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::warn!(status = status.as_u16(), error = %self, "request failed");
        let body = serde_json::json!({
            "error": {
                "code": status.as_u16(),
                "message": self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub codes: CodeMap,
    pub report: Report,
}

/// Outcome of one document of a batch.
#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchItem {
    Codes(CodeMap),
    Error(String),
}

#[derive(Debug, Serialize)]
pub struct LinesResponse {
    pub form_version: String,
    pub sections: &'static [FormSection],
    pub sources: &'static [LineSource],
}

/// Build the API router over the given rules.
pub fn build_router(rules: TaxRules) -> Router {
    let state = Arc::new(AppState { rules });
    Router::new()
        .route("/api/f29/codes", post(codes_handler))
        .route("/api/f29/report", post(report_handler))
        .route("/api/f29/batch", post(batch_handler))
        .route("/api/f29/lines", get(lines_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Handler for POST /api/f29/codes
async fn codes_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<InputDocument>, JsonRejection>,
) -> Result<Json<CodeMap>, ApiError> {
    let Json(input) = payload?;
    let codes = resolve(&input, &state.rules)?;
    Ok(Json(codes))
}

/// Handler for POST /api/f29/report
async fn report_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<InputDocument>, JsonRejection>,
) -> Result<Json<ReportResponse>, ApiError> {
    let Json(input) = payload?;
    let codes = resolve(&input, &state.rules)?;
    let report = build_report(&input, &codes, &state.rules)?;
    Ok(Json(ReportResponse { codes, report }))
}

/// Handler for POST /api/f29/batch.  The batch runs on the blocking
/// pool since it fans out over rayon.
async fn batch_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Vec<InputDocument>>, JsonRejection>,
) -> Result<Json<Vec<BatchItem>>, ApiError> {
    let Json(inputs) = payload?;
    tracing::info!(documents = inputs.len(), "batch");
    let results = tokio::task::spawn_blocking(move || resolve_batch(&inputs, &state.rules))
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    let items = results
        .into_iter()
        .map(|result| match result {
            Ok(codes) => BatchItem::Codes(codes),
            Err(err) => BatchItem::Error(err.to_string()),
        })
        .collect();
    Ok(Json(items))
}

/// Handler for GET /api/f29/lines
async fn lines_handler(State(state): State<Arc<AppState>>) -> Json<LinesResponse> {
    Json(LinesResponse {
        form_version: state.rules.form_version.clone(),
        sections: form::FORM,
        sources: form::LINE_SOURCES,
    })
}

/// Launch the API server on `addr`.  Runs until the server terminates.
pub async fn serve(addr: &str, rules: TaxRules) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, build_router(rules))
        .await
        .context("running server")
}
