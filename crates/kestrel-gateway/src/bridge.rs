//! Channel bridge: binds one plugin's transport to the batch dispatcher.
//!
//! The bridge is transport-agnostic. It consumes inbound text frames from an
//! `mpsc` receiver and writes [`OutboundFrame`]s to an `mpsc` sender; the host
//! binary pumps a WebSocket into and out of those channels.
//!
//! A bridge stops when its plugin is unloaded: batches arriving after the
//! revocation get an error reply and the serve loop returns.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::dispatcher::BatchDispatcher;
use crate::invoker::Invoke;
use crate::ports::PortRegistry;
use crate::protocol::{Inbound, OutboundFrame};

/// One plugin's end of the capability channel.
#[derive(Clone)]
pub struct ChannelBridge {
    plugin_id: String,
    dispatcher: Arc<BatchDispatcher>,
    invoker: Arc<dyn Invoke>,
    ports: Arc<PortRegistry>,
    revoked: watch::Receiver<bool>,
}

/// Error sent for batches that arrive after the plugin was unloaded.
const REVOKED_ERROR: &str = "plugin unloaded";

impl ChannelBridge {
    /// Create a bridge for `plugin_id`.
    pub fn new(
        plugin_id: impl Into<String>,
        dispatcher: Arc<BatchDispatcher>,
        invoker: Arc<dyn Invoke>,
        ports: Arc<PortRegistry>,
    ) -> Self {
        let plugin_id = plugin_id.into();
        let revoked = ports.revocation(&plugin_id);
        Self {
            plugin_id,
            dispatcher,
            invoker,
            ports,
            revoked,
        }
    }

    /// The plugin this bridge speaks for.
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// Whether the plugin has been unloaded since this bridge was created.
    pub fn is_revoked(&self) -> bool {
        *self.revoked.borrow()
    }

    /// Handle one inbound text frame, returning the reply to send, if any.
    pub async fn handle_text(&self, text: &str) -> Option<OutboundFrame> {
        match Inbound::parse(text) {
            Inbound::Batch(request) => {
                let rid = request.id.clone();
                if self.is_revoked() {
                    return Some(OutboundFrame::Failure {
                        rid,
                        error: REVOKED_ERROR.to_string(),
                    });
                }
                let frame = match self
                    .dispatcher
                    .handle_batch(&self.plugin_id, &request, &self.invoker)
                    .await
                {
                    Ok(result) => OutboundFrame::Response { rid, result },
                    Err(e) => OutboundFrame::Failure {
                        rid,
                        error: e.to_string(),
                    },
                };
                Some(frame)
            }
            Inbound::Malformed { rid, error } => {
                tracing::debug!(plugin_id = %self.plugin_id, %rid, %error, "malformed batch frame");
                Some(OutboundFrame::Failure { rid, error })
            }
            Inbound::Ignored => {
                tracing::debug!(plugin_id = %self.plugin_id, "ignoring non-batch frame");
                None
            }
        }
    }

    /// Run the bridge until `inbound` closes or the plugin is unloaded.
    ///
    /// `outbound` is attached as the plugin's bus port for the lifetime of the
    /// loop. Each batch is processed on its own task, so replies may leave in
    /// a different order than requests arrived; they are correlated by `rid`.
    pub async fn serve(
        self,
        mut inbound: mpsc::Receiver<String>,
        outbound: mpsc::Sender<OutboundFrame>,
    ) {
        if self.is_revoked() {
            tracing::debug!(plugin_id = %self.plugin_id, "channel bridge revoked before start");
            return;
        }
        let token = self.ports.attach(&self.plugin_id, outbound.clone());
        tracing::debug!(plugin_id = %self.plugin_id, "channel bridge started");

        let mut revoked = self.revoked.clone();
        loop {
            let text = tokio::select! {
                text = inbound.recv() => match text {
                    Some(text) => text,
                    None => break,
                },
                // Also resolves if the signal was dropped, which only happens on revoke.
                _ = revoked.wait_for(|revoked| *revoked) => {
                    tracing::debug!(plugin_id = %self.plugin_id, "channel bridge revoked");
                    break;
                }
            };

            let bridge = self.clone();
            let tx = outbound.clone();
            tokio::spawn(async move {
                if let Some(frame) = bridge.handle_text(&text).await {
                    if tx.send(frame).await.is_err() {
                        tracing::debug!(
                            plugin_id = %bridge.plugin_id,
                            "reply dropped: channel closed"
                        );
                    }
                }
            });
        }

        self.ports.detach(&self.plugin_id, token);
        tracing::debug!(plugin_id = %self.plugin_id, "channel bridge stopped");
    }
}
