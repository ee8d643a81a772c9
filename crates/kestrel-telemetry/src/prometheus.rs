//! Prometheus text exposition format rendering.
//!
//! Exposes metrics at `/__kestrel/metrics` in Prometheus text format.

use crate::{MetricsRegistry, TelemetryError};
use prometheus_client::encoding::text::encode;

/// Content-Type header value for Prometheus text format.
pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render the metrics registry to Prometheus text format.
pub fn render_metrics(registry: &MetricsRegistry) -> Result<String, TelemetryError> {
    let mut buffer = String::new();
    encode(&mut buffer, &registry.registry).map_err(|e| TelemetryError::Encode(e.to_string()))?;
    Ok(buffer)
}
