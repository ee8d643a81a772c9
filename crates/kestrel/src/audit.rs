//! Audit sink feeding the Prometheus registry as well as the log.

use std::sync::Arc;

use kestrel_gateway::{methods, AuditEntry, AuditSink, BatchError, LogAudit};
use kestrel_telemetry::MetricsRegistry;

/// Metric label for method names outside the capability table.
pub const UNKNOWN_METHOD_LABEL: &str = "unknown";

/// Metric label for `method`. Plugins choose method names freely, so only
/// known ones become label values.
fn method_label(method: &str) -> &str {
    if methods::ALL.contains(&method) {
        method
    } else {
        UNKNOWN_METHOD_LABEL
    }
}

/// Records every call in metrics, then logs it.
pub struct MetricsAudit {
    metrics: Arc<MetricsRegistry>,
    log: LogAudit,
}

impl MetricsAudit {
    pub fn new(metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            metrics,
            log: LogAudit,
        }
    }
}

impl AuditSink for MetricsAudit {
    fn record(&self, entry: &AuditEntry) {
        self.metrics.record_call(
            &entry.plugin_id,
            method_label(&entry.method),
            entry.ok,
            entry.elapsed_ms as f64 / 1000.0,
        );
        if entry.method == methods::BUS_PUBLISH {
            let outcome = if entry.ok { "published" } else { "failed" };
            self.metrics.record_bus_event(outcome);
        }
        self.log.record(entry);
    }

    fn record_rejection(&self, plugin_id: &str, error: &BatchError) {
        self.metrics.record_batch_rejected(plugin_id, error.reason());
        self.log.record_rejection(plugin_id, error);
    }
}
