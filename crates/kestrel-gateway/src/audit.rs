//! Audit trail of capability calls.

use kestrel_telemetry::{log_batch_rejected, log_capability_call};
use serde::Serialize;

use crate::error::BatchError;

/// One executed call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub plugin_id: String,
    pub method: String,
    pub elapsed_ms: u64,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Receives a record of every call the dispatcher runs.
pub trait AuditSink: Send + Sync {
    /// Record one executed call, successful or not.
    fn record(&self, entry: &AuditEntry);

    /// Record a batch rejected at admission.
    fn record_rejection(&self, plugin_id: &str, error: &BatchError) {
        log_batch_rejected!(plugin_id, reason = error.reason(), error = %error, "batch rejected");
    }
}

/// Audit sink writing to the `tracing` log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAudit;

impl AuditSink for LogAudit {
    fn record(&self, entry: &AuditEntry) {
        log_capability_call!(
            plugin_id = %entry.plugin_id,
            method = %entry.method,
            elapsed_ms = entry.elapsed_ms,
            ok = entry.ok,
            error = entry.error.as_deref().unwrap_or_default(),
            "capability call"
        );
    }
}

/// Audit sink keeping entries in memory.
#[derive(Debug, Default)]
pub struct MemoryAudit {
    entries: parking_lot::Mutex<Vec<AuditEntry>>,
    rejections: parking_lot::Mutex<Vec<(String, BatchError)>>,
}

impl MemoryAudit {
    /// Create an empty audit log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded calls, oldest first.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    /// Recorded batch rejections, oldest first.
    pub fn rejections(&self) -> Vec<(String, BatchError)> {
        self.rejections.lock().clone()
    }
}

impl AuditSink for MemoryAudit {
    fn record(&self, entry: &AuditEntry) {
        self.entries.lock().push(entry.clone());
    }

    fn record_rejection(&self, plugin_id: &str, error: &BatchError) {
        self.rejections
            .lock()
            .push((plugin_id.to_string(), error.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_audit_keeps_order() {
        let audit = MemoryAudit::new();
        for (i, ok) in [true, false].into_iter().enumerate() {
            audit.record(&AuditEntry {
                plugin_id: "p".into(),
                method: format!("m{}", i),
                elapsed_ms: 1,
                ok,
                error: (!ok).then(|| "boom".to_string()),
            });
        }
        audit.record_rejection("p", &BatchError::RateLimited { retry_after: 1 });

        let methods: Vec<_> = audit.entries().into_iter().map(|e| e.method).collect();
        assert_eq!(methods, vec!["m0", "m1"]);
        assert_eq!(audit.rejections().len(), 1);
    }

    #[test]
    fn audit_entry_omits_empty_error() {
        let entry = AuditEntry {
            plugin_id: "p".into(),
            method: "bus.publish".into(),
            elapsed_ms: 3,
            ok: true,
            error: None,
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("error"));
    }
}
