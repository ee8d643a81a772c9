//! Error types for the capability gateway.
//!
//! Failures are split in two tiers. [`CallError`] belongs to a single call
//! and is embedded in that call's result entry. [`BatchError`] is raised by
//! an admission gate and rejects the whole batch. [`GatewayError`] covers
//! setup: schema compilation and plugin manifests.

use thiserror::Error;

/// Failure of a single capability call.
///
/// These never abort a batch; the dispatcher turns them into
/// `{ "ok": false, "error": "<display>" }` entries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// Arguments failed schema validation.
    #[error("invalid args: {0}")]
    InvalidArgs(String),

    /// The method is not part of the capability table.
    #[error("unknown method: {0}")]
    UnknownMethod(String),

    /// Topic is outside the public namespace.
    #[error("topic denied: {0}")]
    TopicDenied(String),

    /// The call did not finish within the per-call timeout.
    #[error("timeout")]
    Timeout,

    /// The capability itself failed.
    #[error("handler failure: {0}")]
    HandlerFailure(String),
}

/// Batch-level admission failure. The entire batch is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    /// Serialized batch exceeds the payload ceiling.
    #[error("payload too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Batch carries more calls than allowed.
    #[error("too many calls: {count} exceeds limit of {limit}")]
    TooManyCalls { count: usize, limit: usize },

    /// The caller's token bucket is empty.
    #[error("rate limited: retry after {retry_after}s")]
    RateLimited { retry_after: u64 },
}

impl BatchError {
    /// Short machine-friendly reason, used for metric labels.
    pub fn reason(&self) -> &'static str {
        match self {
            BatchError::PayloadTooLarge { .. } => "payload_too_large",
            BatchError::TooManyCalls { .. } => "too_many_calls",
            BatchError::RateLimited { .. } => "rate_limited",
        }
    }
}

/// Errors raised while setting up the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// A capability schema could not be compiled.
    #[error("failed to parse schema: {0}")]
    SchemaParse(String),

    /// Plugin manifest parsing failed.
    #[error("failed to parse plugin manifest: {0}")]
    ManifestParse(String),

    /// Plugin manifest validation failed.
    #[error("invalid plugin manifest: {0}")]
    ManifestValidation(String),

    /// A plugin with the same identity is already loaded.
    #[error("plugin already loaded: {0}")]
    AlreadyLoaded(String),

    /// No plugin with this identity is loaded.
    #[error("unknown plugin: {0}")]
    UnknownPlugin(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for GatewayError {
    fn from(err: toml::de::Error) -> Self {
        GatewayError::ManifestParse(err.to_string())
    }
}
