//! Host-side collaborators the gateway calls into.
//!
//! The gateway owns none of the host state. Metrics, alerts and the widget
//! registry live with the desktop shell; the gateway only reaches them
//! through these traits. Each implementation decides how to store or
//! forward what it receives.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::capability::{Severity, WidgetSize};
use crate::protocol::OutboundFrame;

/// Time window requested from the metrics store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesRange {
    pub from: f64,
    pub to: f64,
    pub step: u64,
}

/// Provides metric time series. The returned shape is opaque to the gateway.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    async fn get_metric_series(&self, id: &str, range: SeriesRange) -> anyhow::Result<Value>;
}

/// An alert raised by a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginAlert {
    pub severity: Severity,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Identity of the plugin that raised it.
    pub source: String,
}

/// Receives plugin alerts.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn raise_plugin_alert(&self, alert: PluginAlert) -> anyhow::Result<()>;
}

/// How a widget is mounted in the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountKind {
    /// Trusted, first-party component.
    Local,
    /// Sandboxed plugin iframe.
    Iframe,
}

/// Widget category assigned to every plugin-registered widget.
pub const PLUGIN_WIDGET_CATEGORY: &str = "plugins";

/// A widget shell entry created on behalf of a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetShellRegistration {
    pub id: String,
    pub name: String,
    pub mount_kind: MountKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<WidgetSize>,
    pub category: String,
}

/// The shell's widget registry.
#[async_trait]
pub trait WidgetRegistry: Send + Sync {
    async fn register_widget_shell(&self, registration: WidgetShellRegistration)
        -> anyhow::Result<()>;
}

/// Looks up the outbound channel bound to a plugin, if one is attached.
pub trait ChannelDirectory: Send + Sync {
    fn runtime_port(&self, plugin_id: &str) -> Option<mpsc::Sender<OutboundFrame>>;
}
