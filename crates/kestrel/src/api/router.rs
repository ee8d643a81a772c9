//! Axum router configuration.

use std::sync::Arc;

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use kestrel_gateway::Gateway;
use kestrel_telemetry::MetricsRegistry;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::{batch, channel, health, plugins};
use crate::host::InMemoryHost;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub metrics: Arc<MetricsRegistry>,
    /// In-memory collaborators behind the gateway.
    pub host: InMemoryHost,
    /// Outbound buffer per plugin channel.
    pub channel_capacity: usize,
    pub started_at: DateTime<Utc>,
}

/// Count every routed request by method, route template and status.
async fn track_requests(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;
    state
        .metrics
        .record_request(&method, &path, response.status().as_u16());
    response
}

/// Create the router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Reserved endpoints
        .route("/__kestrel/health", get(health::health_check))
        .route("/__kestrel/metrics", get(health::metrics))
        .route("/__kestrel/plugins", get(plugins::list_plugins))
        // Plugin channels
        .route("/plugins/{id}/channel", get(channel::channel_handler))
        // HTTP batch submission
        .route("/api/batch", post(batch::submit_batch))
        // Middleware
        .route_layer(middleware::from_fn_with_state(state.clone(), track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
