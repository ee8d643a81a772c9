//! Publish/subscribe topic bus.
//!
//! Plugins and first-party code exchange events over topics. Only topics in
//! the public namespace (`public:` prefix) may be subscribed to or published
//! on; the prefix is checked on every call and is the bus's entire
//! authorization model.
//!
//! Delivery is fire-and-forget: each subscriber's event is pushed onto its
//! bound channel without waiting. A subscriber with no attached channel, or
//! with a full or closed one, simply misses the event.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use kestrel_telemetry::log_bus_delivery_dropped;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::CallError;
use crate::host::ChannelDirectory;
use crate::protocol::{BusEvent, OutboundFrame};

/// Namespace prefix every plugin-usable topic must carry.
pub const PUBLIC_PREFIX: &str = "public:";

/// Whether `topic` is in the public namespace.
pub fn is_public_topic(topic: &str) -> bool {
    topic.starts_with(PUBLIC_PREFIX)
}

/// Outcome of a publish, for observability only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct PublishReport {
    /// Events handed to a subscriber channel.
    pub delivered: usize,
    /// Subscribers that missed the event (no channel, full, or closed).
    pub dropped: usize,
}

/// Topic registry plus fan-out.
pub struct TopicBus {
    /// topic -> subscribed plugin ids
    subscriptions: RwLock<HashMap<String, BTreeSet<String>>>,
    ports: Arc<dyn ChannelDirectory>,
}

impl TopicBus {
    /// Create a bus delivering through `ports`.
    pub fn new(ports: Arc<dyn ChannelDirectory>) -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            ports,
        }
    }

    /// Subscribe `plugin_id` to `topic`. Subscribing twice is a no-op.
    pub fn subscribe(&self, plugin_id: &str, topic: &str) -> Result<(), CallError> {
        if !is_public_topic(topic) {
            return Err(CallError::TopicDenied(topic.to_string()));
        }

        let added = self
            .subscriptions
            .write()
            .entry(topic.to_string())
            .or_default()
            .insert(plugin_id.to_string());

        if added {
            tracing::debug!(plugin_id, topic, "subscribed");
        }
        Ok(())
    }

    /// Remove `plugin_id` from `topic`, if subscribed.
    pub fn unsubscribe(&self, plugin_id: &str, topic: &str) {
        let mut subscriptions = self.subscriptions.write();
        if let Some(subscribers) = subscriptions.get_mut(topic) {
            subscribers.remove(plugin_id);
            if subscribers.is_empty() {
                subscriptions.remove(topic);
            }
        }
    }

    /// Drop every subscription held by `plugin_id`.
    pub fn unsubscribe_all(&self, plugin_id: &str) -> usize {
        let mut removed = 0;
        self.subscriptions.write().retain(|_, subscribers| {
            if subscribers.remove(plugin_id) {
                removed += 1;
            }
            !subscribers.is_empty()
        });
        removed
    }

    /// Deliver `payload` to every subscriber of `topic` except `from_id`.
    pub fn publish(
        &self,
        from_id: &str,
        topic: &str,
        payload: Value,
    ) -> Result<PublishReport, CallError> {
        if !is_public_topic(topic) {
            return Err(CallError::TopicDenied(topic.to_string()));
        }

        // Snapshot so no lock is held while pushing onto channels.
        let targets: Vec<String> = match self.subscriptions.read().get(topic) {
            Some(subscribers) => subscribers
                .iter()
                .filter(|id| id.as_str() != from_id)
                .cloned()
                .collect(),
            None => return Ok(PublishReport::default()),
        };

        let mut report = PublishReport::default();
        for target in &targets {
            let Some(port) = self.ports.runtime_port(target) else {
                report.dropped += 1;
                continue;
            };

            let frame = OutboundFrame::Event(BusEvent::new(topic, from_id, payload.clone()));
            match port.try_send(frame) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    report.dropped += 1;
                    log_bus_delivery_dropped!(
                        topic,
                        subscriber = %target,
                        reason = "channel_full",
                        "bus delivery dropped"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    report.dropped += 1;
                    tracing::debug!(
                        topic,
                        subscriber = %target,
                        "bus delivery dropped: channel closed"
                    );
                }
            }
        }

        Ok(report)
    }

    /// Current subscribers of `topic`.
    pub fn subscribers(&self, topic: &str) -> Vec<String> {
        self.subscriptions
            .read()
            .get(topic)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Topics with at least one subscriber.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.subscriptions.read().keys().cloned().collect();
        topics.sort();
        topics
    }
}
