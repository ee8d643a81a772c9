//! Capability invoker: validates a call, then routes it to its handler.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::bus::TopicBus;
use crate::capability::Capability;
use crate::error::CallError;
use crate::frozen::FrozenArgs;
use crate::host::{
    AlertSink, MetricsStore, MountKind, PluginAlert, SeriesRange, WidgetRegistry,
    WidgetShellRegistration, PLUGIN_WIDGET_CATEGORY,
};
use crate::schema::SchemaTable;

/// Something that can execute one capability call for a plugin.
///
/// The batch dispatcher is written against this trait so tests can supply
/// handlers with arbitrary timing.
#[async_trait]
pub trait Invoke: Send + Sync {
    async fn invoke(
        &self,
        plugin_id: &str,
        method: &str,
        args: FrozenArgs,
    ) -> Result<Value, CallError>;
}

/// Host collaborators the invoker delegates to.
#[derive(Clone)]
pub struct HostServices {
    pub metrics: Arc<dyn MetricsStore>,
    pub alerts: Arc<dyn AlertSink>,
    pub widgets: Arc<dyn WidgetRegistry>,
}

/// The built-in capability table.
pub struct CapabilityInvoker {
    schemas: Arc<SchemaTable>,
    bus: Arc<TopicBus>,
    host: HostServices,
}

impl CapabilityInvoker {
    /// Create an invoker.
    pub fn new(schemas: Arc<SchemaTable>, bus: Arc<TopicBus>, host: HostServices) -> Self {
        Self { schemas, bus, host }
    }

    async fn execute(&self, plugin_id: &str, capability: Capability) -> Result<Value, CallError> {
        match capability {
            Capability::GetSeries(args) => {
                let range = SeriesRange {
                    from: args.from,
                    to: args.to,
                    step: args.step,
                };
                self.host
                    .metrics
                    .get_metric_series(&args.id, range)
                    .await
                    .map_err(handler_failure)
            }
            Capability::RaiseAlert(args) => {
                let alert = PluginAlert {
                    severity: args.severity,
                    title: args.title,
                    details: args.details,
                    source: plugin_id.to_string(),
                };
                self.host
                    .alerts
                    .raise_plugin_alert(alert)
                    .await
                    .map_err(handler_failure)?;
                Ok(json!({ "ok": true }))
            }
            Capability::RegisterWidget(args) => {
                // Plugins only ever get sandboxed iframe shells bound to themselves.
                let registration = WidgetShellRegistration {
                    id: args.id,
                    name: args.name,
                    mount_kind: MountKind::Iframe,
                    plugin_id: Some(plugin_id.to_string()),
                    size: args.size,
                    category: PLUGIN_WIDGET_CATEGORY.to_string(),
                };
                self.host
                    .widgets
                    .register_widget_shell(registration)
                    .await
                    .map_err(handler_failure)?;
                Ok(json!({ "ok": true }))
            }
            Capability::Subscribe(args) => {
                self.bus.subscribe(plugin_id, &args.topic)?;
                Ok(json!({ "ok": true }))
            }
            Capability::Unsubscribe(args) => {
                self.bus.unsubscribe(plugin_id, &args.topic);
                Ok(json!({ "ok": true }))
            }
            Capability::Publish(args) => {
                let report = self.bus.publish(plugin_id, &args.topic, args.payload)?;
                Ok(json!({ "ok": true, "delivered": report.delivered }))
            }
        }
    }
}

fn handler_failure(err: anyhow::Error) -> CallError {
    CallError::HandlerFailure(format!("{:#}", err))
}

#[async_trait]
impl Invoke for CapabilityInvoker {
    async fn invoke(
        &self,
        plugin_id: &str,
        method: &str,
        args: FrozenArgs,
    ) -> Result<Value, CallError> {
        self.schemas
            .validate(method, &args)
            .map_err(CallError::InvalidArgs)?;

        let capability = Capability::decode(method, &args)?;
        self.execute(plugin_id, capability).await
    }
}
