//! The plugin-facing capability table.
//!
//! Each capability method has a stable name, one argument schema (see
//! [`crate::schema`]) and one typed argument shape below. Adding a method
//! means adding all three.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CallError;

/// Capability method names.
pub mod methods {
    /// Read a metric time series from the host metrics store.
    pub const GET_SERIES: &str = "metrics.read.getSeries";

    /// Raise an alert attributed to the calling plugin.
    pub const RAISE_ALERT: &str = "alerts.write.raise";

    /// Register an iframe-mounted widget shell owned by the caller.
    pub const REGISTER_WIDGET: &str = "plugins.registerWidget";

    /// Subscribe the caller to a public topic.
    pub const BUS_SUBSCRIBE: &str = "bus.subscribe";

    /// Remove the caller from a topic.
    pub const BUS_UNSUBSCRIBE: &str = "bus.unsubscribe";

    /// Publish to a public topic.
    pub const BUS_PUBLISH: &str = "bus.publish";

    /// Every method in the dispatch table.
    pub const ALL: &[&str] = &[
        GET_SERIES,
        RAISE_ALERT,
        REGISTER_WIDGET,
        BUS_SUBSCRIBE,
        BUS_UNSUBSCRIBE,
        BUS_PUBLISH,
    ];
}

/// Arguments of `metrics.read.getSeries`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GetSeriesArgs {
    pub id: String,
    pub from: f64,
    pub to: f64,
    pub step: u64,
}

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

/// Arguments of `alerts.write.raise`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RaiseAlertArgs {
    pub severity: Severity,
    pub title: String,
    #[serde(default)]
    pub details: Option<String>,
}

/// Requested widget grid size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetSize {
    pub w: u32,
    pub h: u32,
}

/// Arguments of `plugins.registerWidget`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RegisterWidgetArgs {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub size: Option<WidgetSize>,
}

/// Arguments of `bus.subscribe` and `bus.unsubscribe`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TopicArgs {
    pub topic: String,
}

/// Arguments of `bus.publish`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PublishArgs {
    pub topic: String,
    #[serde(default)]
    pub payload: Value,
}

/// A decoded capability call.
#[derive(Debug, Clone, PartialEq)]
pub enum Capability {
    GetSeries(GetSeriesArgs),
    RaiseAlert(RaiseAlertArgs),
    RegisterWidget(RegisterWidgetArgs),
    Subscribe(TopicArgs),
    Unsubscribe(TopicArgs),
    Publish(PublishArgs),
}

impl Capability {
    /// Decode already-validated arguments for `method`.
    pub fn decode(method: &str, args: &Value) -> Result<Self, CallError> {
        let capability = match method {
            methods::GET_SERIES => Capability::GetSeries(decode_args(args)?),
            methods::RAISE_ALERT => Capability::RaiseAlert(decode_args(args)?),
            methods::REGISTER_WIDGET => Capability::RegisterWidget(decode_args(args)?),
            methods::BUS_SUBSCRIBE => Capability::Subscribe(decode_args(args)?),
            methods::BUS_UNSUBSCRIBE => Capability::Unsubscribe(decode_args(args)?),
            methods::BUS_PUBLISH => Capability::Publish(decode_args(args)?),
            other => return Err(CallError::UnknownMethod(other.to_string())),
        };
        Ok(capability)
    }
}

fn decode_args<T: for<'de> Deserialize<'de>>(args: &Value) -> Result<T, CallError> {
    T::deserialize(args).map_err(|e| CallError::InvalidArgs(e.to_string()))
}
