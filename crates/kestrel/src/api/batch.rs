//! POST /api/batch: batch submission over plain HTTP.
//!
//! The plugin identity comes from `x-app-id`. Requests pass the coarse
//! `appId:scope` bucket first, then the dispatcher's own gates.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use kestrel_gateway::{BatchError, BatchRequest, OutboundFrame};

use super::error::ProblemDetails;
use super::router::AppState;

/// Header carrying the calling plugin's identity.
pub const APP_ID_HEADER: &str = "x-app-id";

/// Header selecting the HTTP rate-limit scope.
pub const SCOPE_HEADER: &str = "x-scope";

const DEFAULT_SCOPE: &str = "default";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// HTTP status for a gate rejection.
fn rejection_status(error: &BatchError) -> StatusCode {
    match error {
        BatchError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        BatchError::TooManyCalls { .. } => StatusCode::BAD_REQUEST,
        BatchError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
    }
}

pub async fn submit_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProblemDetails> {
    let app_id = header_str(&headers, APP_ID_HEADER)
        .ok_or_else(|| ProblemDetails::bad_request("missing x-app-id header"))?;
    let scope = header_str(&headers, SCOPE_HEADER).unwrap_or(DEFAULT_SCOPE);

    if !state.gateway.registry().contains(app_id) {
        return Err(ProblemDetails::not_found(format!("unknown plugin: {}", app_id)));
    }

    let admission = state.gateway.check_http(app_id, scope);
    if !admission.allowed {
        state.metrics.record_http_rate_limited(app_id);
        return Err(ProblemDetails::rate_limited(
            admission.retry_after.unwrap_or(1),
        ));
    }

    let request: BatchRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            let rid = serde_json::from_slice::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(str::to_string));
            let error = format!("invalid batch: {}", e);
            return Ok(match rid {
                Some(rid) => (
                    StatusCode::BAD_REQUEST,
                    Json(OutboundFrame::Failure { rid, error }),
                )
                    .into_response(),
                None => ProblemDetails::bad_request(error).into_response(),
            });
        }
    };

    let rid = request.id.clone();
    let response = match state.gateway.handle_batch(app_id, &request).await {
        Ok(result) => {
            (StatusCode::OK, Json(OutboundFrame::Response { rid, result })).into_response()
        }
        Err(e) => {
            let status = rejection_status(&e);
            let retry_after = match e {
                BatchError::RateLimited { retry_after } => Some(retry_after),
                _ => None,
            };
            let mut response = (
                status,
                Json(OutboundFrame::Failure {
                    rid,
                    error: e.to_string(),
                }),
            )
                .into_response();
            if let Some(seconds) = retry_after {
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
            }
            response
        }
    };

    Ok(response)
}
