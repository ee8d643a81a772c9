//! Capability gateway for sandboxed Kestrel OS plugins.
//!
//! Plugins run in sandboxed iframes and reach the host only through batched
//! capability calls sent over a message channel. This crate owns everything
//! between that channel and the host's own services:
//!
//! - argument validation against per-method JSON Schemas ([`SchemaTable`]);
//! - token-bucket admission control ([`RateLimiter`]);
//! - the `public:` topic bus ([`TopicBus`]);
//! - capability execution ([`CapabilityInvoker`]);
//! - batch admission, timeouts and ordering ([`BatchDispatcher`]);
//! - the transport binding ([`ChannelBridge`]).
//!
//! [`Gateway`] wires these together for a host process.

pub mod audit;
mod bridge;
pub mod bus;
pub mod capability;
mod dispatcher;
mod error;
mod frozen;
mod gateway;
pub mod host;
mod invoker;
mod limits;
mod manifest;
mod ports;
pub mod protocol;
pub mod rate_limiter;
mod registry;
mod schema;

pub use audit::{AuditEntry, AuditSink, LogAudit, MemoryAudit};
pub use bridge::ChannelBridge;
pub use bus::{is_public_topic, PublishReport, TopicBus, PUBLIC_PREFIX};
pub use capability::{methods, Capability, Severity, WidgetSize};
pub use dispatcher::BatchDispatcher;
pub use error::{BatchError, CallError, GatewayError};
pub use frozen::FrozenArgs;
pub use gateway::{Gateway, HOST_IDENTITY};
pub use host::{
    AlertSink, ChannelDirectory, MetricsStore, MountKind, PluginAlert, SeriesRange,
    WidgetRegistry, WidgetShellRegistration, PLUGIN_WIDGET_CATEGORY,
};
pub use invoker::{CapabilityInvoker, HostServices, Invoke};
pub use limits::{BatchLimits, BucketLimits};
pub use manifest::{Permissions, PluginManifest, PluginMeta};
pub use ports::{PortRegistry, PortToken};
pub use protocol::{
    BatchRequest, BatchResult, BusEvent, CallEnvelope, CallResult, Inbound, OutboundFrame,
};
pub use rate_limiter::{RateLimitResult, RateLimiter, RateLimiterStats};
pub use registry::{scan_dir, PluginRegistry, MANIFEST_FILE};
pub use schema::{ArgSchema, SchemaTable};
