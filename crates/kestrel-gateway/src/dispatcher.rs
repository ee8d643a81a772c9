//! Batch dispatcher.
//!
//! A batch passes three admission gates, in order, before any call runs:
//! payload size, call count, then the caller's token bucket. Failing a gate
//! rejects the whole batch with a [`BatchError`]. Admitted calls run one
//! after another in array order; each is raced against the per-call timeout
//! and its outcome is embedded at the same index of the [`BatchResult`].

use std::sync::Arc;

use serde_json::Value;
use tokio::time::Instant;

use crate::audit::{AuditEntry, AuditSink};
use crate::error::{BatchError, CallError};
use crate::frozen::FrozenArgs;
use crate::invoker::Invoke;
use crate::limits::BatchLimits;
use crate::protocol::{BatchRequest, BatchResult, CallEnvelope, CallResult};
use crate::rate_limiter::RateLimiter;

/// Admits and executes plugin batches.
pub struct BatchDispatcher {
    limits: BatchLimits,
    limiter: RateLimiter,
    audit: Arc<dyn AuditSink>,
}

impl BatchDispatcher {
    /// Create a dispatcher with its own per-plugin token buckets.
    pub fn new(limits: BatchLimits, audit: Arc<dyn AuditSink>) -> Self {
        let limiter = RateLimiter::new(limits.rate);
        Self {
            limits,
            limiter,
            audit,
        }
    }

    /// The limits this dispatcher enforces.
    pub fn limits(&self) -> &BatchLimits {
        &self.limits
    }

    /// Forget the token bucket of an unloaded plugin.
    pub fn forget(&self, plugin_id: &str) {
        self.limiter.forget(plugin_id);
    }

    /// Admit `request` and run its calls through `invoker`.
    pub async fn handle_batch(
        &self,
        plugin_id: &str,
        request: &BatchRequest,
        invoker: &Arc<dyn Invoke>,
    ) -> Result<BatchResult, BatchError> {
        if let Err(e) = self.admit(plugin_id, request) {
            self.audit.record_rejection(plugin_id, &e);
            return Err(e);
        }

        let mut results = Vec::with_capacity(request.calls.len());
        for call in &request.calls {
            let started = Instant::now();
            let outcome = self.run_call(plugin_id, call, invoker).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            self.audit.record(&AuditEntry {
                plugin_id: plugin_id.to_string(),
                method: call.method.clone(),
                elapsed_ms,
                ok: outcome.is_ok(),
                error: outcome.as_ref().err().map(ToString::to_string),
            });
            results.push(CallResult::from(outcome));
        }

        Ok(BatchResult { results })
    }

    fn admit(&self, plugin_id: &str, request: &BatchRequest) -> Result<(), BatchError> {
        let size = serde_json::to_vec(request).map_or(usize::MAX, |bytes| bytes.len());
        if size > self.limits.max_payload_bytes {
            return Err(BatchError::PayloadTooLarge {
                size,
                limit: self.limits.max_payload_bytes,
            });
        }

        if request.calls.len() > self.limits.max_calls {
            return Err(BatchError::TooManyCalls {
                count: request.calls.len(),
                limit: self.limits.max_calls,
            });
        }

        let admission = self.limiter.check(plugin_id);
        if !admission.allowed {
            return Err(BatchError::RateLimited {
                retry_after: admission.retry_after.unwrap_or(1),
            });
        }

        Ok(())
    }

    /// Run one call on its own task, bounded by the call timeout.
    ///
    /// On timeout the task is detached rather than aborted: it may still
    /// finish, but its result is discarded.
    async fn run_call(
        &self,
        plugin_id: &str,
        call: &CallEnvelope,
        invoker: &Arc<dyn Invoke>,
    ) -> Result<Value, CallError> {
        let args = FrozenArgs::freeze(&call.args);
        let invoker = Arc::clone(invoker);
        let caller = plugin_id.to_string();
        let method = call.method.clone();

        let task =
            tokio::spawn(async move { invoker.invoke(&caller, &method, args).await });

        match tokio::time::timeout(self.limits.call_timeout(), task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_error)) => {
                let reason = if join_error.is_panic() {
                    "handler panicked"
                } else {
                    "handler cancelled"
                };
                tracing::error!(plugin_id, method = %call.method, "{}", reason);
                Err(CallError::HandlerFailure(reason.to_string()))
            }
            Err(_) => {
                tracing::warn!(
                    plugin_id,
                    method = %call.method,
                    timeout_ms = self.limits.call_timeout_ms,
                    "capability call timed out"
                );
                Err(CallError::Timeout)
            }
        }
    }
}
