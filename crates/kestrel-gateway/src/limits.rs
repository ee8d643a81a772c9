//! Admission limits for plugin batches.
//!
//! Every batch submitted by a plugin is constrained:
//! - Serialized size: 64 KiB
//! - Calls per batch: 20
//! - Execution time per call: 2000 ms
//! - Dispatcher bucket: 50 tokens, refilled at 10/s per plugin
//!
//! The HTTP-facing layer has its own, coarser bucket keyed by `appId:scope`.

use std::time::Duration;

use serde::Deserialize;

/// Limits enforced by the batch dispatcher.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BatchLimits {
    /// Maximum serialized batch size in bytes (default: 64 KiB).
    pub max_payload_bytes: usize,

    /// Maximum calls per batch (default: 20).
    pub max_calls: usize,

    /// Per-call timeout in milliseconds (default: 2000 ms).
    pub call_timeout_ms: u64,

    /// Token bucket applied per plugin identity.
    pub rate: BucketLimits,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_payload_bytes: 64 * 1024,
            max_calls: 20,
            call_timeout_ms: 2000,
            rate: BucketLimits::dispatcher(),
        }
    }
}

impl BatchLimits {
    /// Set the payload ceiling.
    pub fn with_max_payload(mut self, bytes: usize) -> Self {
        self.max_payload_bytes = bytes;
        self
    }

    /// Set the call count ceiling.
    pub fn with_max_calls(mut self, calls: usize) -> Self {
        self.max_calls = calls;
        self
    }

    /// Set the per-call timeout.
    pub fn with_timeout(mut self, ms: u64) -> Self {
        self.call_timeout_ms = ms;
        self
    }

    /// Set the per-plugin token bucket.
    pub fn with_rate(mut self, rate: BucketLimits) -> Self {
        self.rate = rate;
        self
    }

    /// Per-call timeout as a [`Duration`].
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// Token bucket parameters.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct BucketLimits {
    /// Maximum tokens (burst size).
    pub capacity: u32,

    /// Tokens added per second.
    pub refill_per_sec: f64,
}

impl BucketLimits {
    /// Create bucket limits.
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        Self {
            capacity,
            refill_per_sec,
        }
    }

    /// Fine-grained per-plugin bucket used inside the dispatcher.
    pub fn dispatcher() -> Self {
        Self::new(50, 10.0)
    }

    /// Coarse bucket for HTTP-facing calls keyed by `appId:scope`.
    pub fn http() -> Self {
        Self::new(20, 10.0)
    }
}

impl Default for BucketLimits {
    fn default() -> Self {
        Self::dispatcher()
    }
}
