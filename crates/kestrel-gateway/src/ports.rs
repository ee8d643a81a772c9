//! Registry of outbound channels bound to plugin instances.
//!
//! Besides the attached channel, every plugin identity has a revocation
//! signal. Unloading a plugin fires it, which stops any bridge still serving
//! that identity.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::{mpsc, watch};

use crate::host::ChannelDirectory;
use crate::protocol::OutboundFrame;

/// Handle identifying one attachment, so a stale bridge cannot detach the
/// channel that replaced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortToken(u64);

#[derive(Debug)]
struct Port {
    token: PortToken,
    tx: mpsc::Sender<OutboundFrame>,
}

/// Tracks the currently attached channel of every plugin.
#[derive(Debug, Default)]
pub struct PortRegistry {
    /// plugin_id -> attached channel
    ports: DashMap<String, Port>,
    /// plugin_id -> revocation signal, fired once on unload
    revocations: DashMap<String, watch::Sender<bool>>,
    next_token: AtomicU64,
}

impl PortRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `tx` as the channel of `plugin_id`, replacing any previous one.
    pub fn attach(&self, plugin_id: &str, tx: mpsc::Sender<OutboundFrame>) -> PortToken {
        let token = PortToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        let replaced = self
            .ports
            .insert(plugin_id.to_string(), Port { token, tx })
            .is_some();

        tracing::debug!(plugin_id, replaced, "plugin channel attached");
        token
    }

    /// Detach the channel of `plugin_id` if it is still the one `token` names.
    pub fn detach(&self, plugin_id: &str, token: PortToken) -> bool {
        let removed = self
            .ports
            .remove_if(plugin_id, |_, port| port.token == token)
            .is_some();
        if removed {
            tracing::debug!(plugin_id, "plugin channel detached");
        }
        removed
    }

    /// Subscribe to the revocation signal of `plugin_id`.
    ///
    /// The receiver reads `true` once [`revoke`](Self::revoke) has run for
    /// this identity. A revocation is final for its receivers; identities
    /// loaded again later get a fresh signal.
    pub fn revocation(&self, plugin_id: &str) -> watch::Receiver<bool> {
        self.revocations
            .entry(plugin_id.to_string())
            .or_insert_with(|| watch::channel(false).0)
            .subscribe()
    }

    /// Detach whatever channel `plugin_id` has and revoke every bridge
    /// serving it.
    pub fn revoke(&self, plugin_id: &str) {
        self.ports.remove(plugin_id);
        if let Some((_, signal)) = self.revocations.remove(plugin_id) {
            signal.send_replace(true);
            tracing::debug!(plugin_id, "plugin channel revoked");
        }
    }

    /// Whether `plugin_id` currently has a channel.
    pub fn is_attached(&self, plugin_id: &str) -> bool {
        self.ports.contains_key(plugin_id)
    }

    /// Number of attached channels.
    pub fn len(&self) -> usize {
        self.ports.len()
    }

    /// Whether no channel is attached.
    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}

impl ChannelDirectory for PortRegistry {
    fn runtime_port(&self, plugin_id: &str) -> Option<mpsc::Sender<OutboundFrame>> {
        self.ports.get(plugin_id).map(|port| port.tx.clone())
    }
}
