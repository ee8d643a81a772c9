//! Gateway facade tying the components together.

use std::path::Path;
use std::sync::Arc;

use kestrel_telemetry::{log_plugin_loaded, log_plugin_unloaded};
use serde_json::Value;

use crate::audit::AuditSink;
use crate::bridge::ChannelBridge;
use crate::bus::{PublishReport, TopicBus};
use crate::dispatcher::BatchDispatcher;
use crate::error::{BatchError, CallError, GatewayError};
use crate::invoker::{CapabilityInvoker, HostServices, Invoke};
use crate::limits::{BatchLimits, BucketLimits};
use crate::manifest::PluginManifest;
use crate::ports::PortRegistry;
use crate::protocol::{BatchRequest, BatchResult};
use crate::rate_limiter::{RateLimitResult, RateLimiter};
use crate::registry::PluginRegistry;
use crate::schema::SchemaTable;

/// Identity first-party code publishes under.
pub const HOST_IDENTITY: &str = "host";

/// Owns every piece of gateway state.
pub struct Gateway {
    schemas: Arc<SchemaTable>,
    ports: Arc<PortRegistry>,
    bus: Arc<TopicBus>,
    invoker: Arc<dyn Invoke>,
    dispatcher: Arc<BatchDispatcher>,
    http_limiter: RateLimiter,
    registry: PluginRegistry,
}

impl Gateway {
    /// Build a gateway over the given host collaborators.
    pub fn new(
        host: HostServices,
        limits: BatchLimits,
        http: BucketLimits,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, GatewayError> {
        let schemas = Arc::new(SchemaTable::builtin()?);
        let ports = Arc::new(PortRegistry::new());
        let bus = Arc::new(TopicBus::new(ports.clone()));
        let invoker: Arc<dyn Invoke> =
            Arc::new(CapabilityInvoker::new(schemas.clone(), bus.clone(), host));
        let dispatcher = Arc::new(BatchDispatcher::new(limits, audit));

        Ok(Self {
            schemas,
            ports,
            bus,
            invoker,
            dispatcher,
            http_limiter: RateLimiter::new(http),
            registry: PluginRegistry::new(),
        })
    }

    /// Register a plugin.
    pub fn load_plugin(
        &self,
        manifest: PluginManifest,
    ) -> Result<Arc<PluginManifest>, GatewayError> {
        let manifest = self.registry.load(manifest)?;
        log_plugin_loaded!(
            plugin_id = %manifest.id(),
            version = %manifest.plugin.version,
            "plugin loaded"
        );
        Ok(manifest)
    }

    /// Register every plugin found under `dir`.
    pub fn load_dir(&self, dir: &Path) -> Result<Vec<Arc<PluginManifest>>, GatewayError> {
        let loaded = self.registry.load_dir(dir)?;
        for manifest in &loaded {
            log_plugin_loaded!(
                plugin_id = %manifest.id(),
                version = %manifest.plugin.version,
                "plugin loaded"
            );
        }
        Ok(loaded)
    }

    /// Unload a plugin and drop all state keyed by its identity: its
    /// dispatcher bucket, its HTTP buckets, its subscriptions and its port.
    /// Bridges still serving the plugin are revoked.
    pub fn unload_plugin(&self, plugin_id: &str) -> Option<Arc<PluginManifest>> {
        let manifest = self.registry.unload(plugin_id)?;

        // Revoke first so running bridges stop admitting batches before the
        // identity's state is cleared.
        self.ports.revoke(plugin_id);
        self.dispatcher.forget(plugin_id);
        self.http_limiter.forget_prefix(&format!("{}:", plugin_id));
        let subscriptions = self.bus.unsubscribe_all(plugin_id);

        log_plugin_unloaded!(plugin_id, subscriptions, "plugin unloaded");
        Some(manifest)
    }

    /// A channel bridge bound to a loaded plugin.
    pub fn bridge(&self, plugin_id: &str) -> Result<ChannelBridge, GatewayError> {
        // Subscribe to revocation before the registry check, so an unload
        // racing with this call still reaches the bridge.
        let bridge = ChannelBridge::new(
            plugin_id,
            self.dispatcher.clone(),
            self.invoker.clone(),
            self.ports.clone(),
        );
        if !self.registry.contains(plugin_id) {
            return Err(GatewayError::UnknownPlugin(plugin_id.to_string()));
        }
        Ok(bridge)
    }

    /// Run a batch on behalf of `plugin_id`.
    ///
    /// The caller is responsible for having established the plugin's
    /// identity; no registry lookup happens here.
    pub async fn handle_batch(
        &self,
        plugin_id: &str,
        request: &BatchRequest,
    ) -> Result<BatchResult, BatchError> {
        self.dispatcher
            .handle_batch(plugin_id, request, &self.invoker)
            .await
    }

    /// Coarse admission check for the HTTP surface, keyed by `app_id:scope`.
    pub fn check_http(&self, app_id: &str, scope: &str) -> RateLimitResult {
        self.http_limiter.check(&format!("{}:{}", app_id, scope))
    }

    /// Publish on the bus as first-party code.
    pub fn publish_from_host(
        &self,
        topic: &str,
        payload: Value,
    ) -> Result<PublishReport, CallError> {
        self.bus.publish(HOST_IDENTITY, topic, payload)
    }

    pub fn bus(&self) -> &Arc<TopicBus> {
        &self.bus
    }

    pub fn ports(&self) -> &Arc<PortRegistry> {
        &self.ports
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn schemas(&self) -> &SchemaTable {
        &self.schemas
    }

    pub fn limits(&self) -> &BatchLimits {
        self.dispatcher.limits()
    }
}
