//! Structured logging: JSON (default) or pretty output to stdout.

use crate::{LogFormat, TelemetryConfig, TelemetryError};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize the logging subsystem.
///
/// Sets up tracing-subscriber with either JSON or pretty format,
/// respecting the configured log level.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    // Build the env filter from config or RUST_LOG
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match config.log_format {
        LogFormat::Json => init_json_logging(filter),
        LogFormat::Pretty => init_pretty_logging(filter),
    }
}

/// Initialize JSON logging for production.
fn init_json_logging(filter: EnvFilter) -> Result<(), TelemetryError> {
    let json_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_current_span(true)
        .with_span_list(false)
        .with_file(false)
        .with_line_number(false)
        .flatten_event(true)
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(json_layer)
        .try_init()
        .map_err(|e: tracing_subscriber::util::TryInitError| {
            TelemetryError::LoggingInit(e.to_string())
        })
}

/// Initialize pretty logging for development.
fn init_pretty_logging(filter: EnvFilter) -> Result<(), TelemetryError> {
    let pretty_layer = fmt::layer()
        .pretty()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(pretty_layer)
        .try_init()
        .map_err(|e: tracing_subscriber::util::TryInitError| {
            TelemetryError::LoggingInit(e.to_string())
        })
}

/// Standard log event names.
pub mod events {
    /// Gateway is starting up.
    pub const STARTUP: &str = "startup";

    /// Gateway is shutting down.
    pub const SHUTDOWN: &str = "shutdown";

    /// Gateway is listening on a port.
    pub const LISTENING: &str = "listening";

    /// Plugin has been loaded into the registry.
    pub const PLUGIN_LOADED: &str = "plugin_loaded";

    /// Plugin has been unloaded and its state cleared.
    pub const PLUGIN_UNLOADED: &str = "plugin_unloaded";

    /// A batch was rejected at admission.
    pub const BATCH_REJECTED: &str = "batch_rejected";

    /// A capability call completed (successfully or not).
    pub const CAPABILITY_CALL: &str = "capability_call";

    /// A bus event could not be handed to a subscriber.
    pub const BUS_DELIVERY_DROPPED: &str = "bus_delivery_dropped";

    /// A plugin channel opened or closed.
    pub const CHANNEL: &str = "channel";
}

/// Helper macros for structured logging with standard fields.
///
/// These wrap the tracing macros to ensure consistent field naming.
#[macro_export]
macro_rules! log_startup {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::STARTUP,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_shutdown {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::SHUTDOWN,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_listening {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::LISTENING,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_plugin_loaded {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::PLUGIN_LOADED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_plugin_unloaded {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::PLUGIN_UNLOADED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_batch_rejected {
    ($($field:tt)*) => {
        tracing::warn!(
            event = $crate::logging::events::BATCH_REJECTED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_capability_call {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::CAPABILITY_CALL,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_bus_delivery_dropped {
    ($($field:tt)*) => {
        tracing::warn!(
            event = $crate::logging::events::BUS_DELIVERY_DROPPED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_channel {
    ($($field:tt)*) => {
        tracing::debug!(
            event = $crate::logging::events::CHANNEL,
            $($field)*
        )
    };
}
