//! Health and metrics endpoints.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use kestrel_telemetry::{prometheus::render_metrics, PROMETHEUS_CONTENT_TYPE};
use serde::Serialize;

use super::error::ProblemDetails;
use super::router::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub plugins: usize,
    pub channels: usize,
    pub uptime_secs: i64,
}

/// GET /__kestrel/health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        plugins: state.gateway.registry().len(),
        channels: state.gateway.ports().len(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}

/// GET /__kestrel/metrics
pub async fn metrics(State(state): State<AppState>) -> Response {
    match render_metrics(&state.metrics) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(e) => ProblemDetails::internal_error_with_detail(e.to_string()).into_response(),
    }
}
