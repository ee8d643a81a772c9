//! WebSocket endpoint binding a plugin iframe to its channel bridge.

use std::time::Duration;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use kestrel_gateway::{ChannelBridge, OutboundFrame};
use kestrel_telemetry::log_channel;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::error::ProblemDetails;
use super::router::AppState;

/// How long the writer may take to flush after the bridge stops.
const WRITER_DRAIN: Duration = Duration::from_secs(1);

/// GET /plugins/{id}/channel
pub async fn channel_handler(
    Path(plugin_id): Path<String>,
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    // Unknown plugins get a 404 whether or not this is an upgrade request.
    let bridge = match state.gateway.bridge(&plugin_id) {
        Ok(bridge) => bridge,
        Err(e) => return ProblemDetails::not_found(e.to_string()).into_response(),
    };

    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| handle_socket(socket, bridge, state)),
        Err(rejection) => rejection.into_response(),
    }
}

/// Pump one WebSocket through a channel bridge until either side closes.
async fn handle_socket(socket: WebSocket, bridge: ChannelBridge, state: AppState) {
    let connection_id = Uuid::new_v4();
    let plugin_id = bridge.plugin_id().to_string();
    let (mut sender, mut receiver) = socket.split();

    let (in_tx, in_rx) = mpsc::channel::<String>(state.channel_capacity);
    let (out_tx, mut out_rx) = mpsc::channel::<OutboundFrame>(state.channel_capacity);

    state.metrics.channel_opened();
    log_channel!(plugin_id = %plugin_id, %connection_id, "plugin channel opened");

    let mut bridge_task = tokio::spawn(bridge.serve(in_rx, out_tx));
    let mut bridge_finished = false;

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if sender.send(Message::Text(frame.to_json().into())).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    loop {
        tokio::select! {
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if in_tx.send(text.as_str().to_owned()).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                // Binary frames carry nothing for us; pings are answered by axum.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(
                        plugin_id = %plugin_id,
                        %connection_id,
                        error = %e,
                        "channel read failed"
                    );
                    break;
                }
            },
            // The bridge stops on its own when the plugin is unloaded.
            joined = &mut bridge_task => {
                bridge_finished = true;
                if let Err(e) = joined {
                    tracing::error!(
                        plugin_id = %plugin_id,
                        error = %e,
                        "channel bridge task failed"
                    );
                }
                break;
            }
        }
    }

    // Closing the inbound side stops the bridge, which detaches the port.
    drop(in_tx);
    if !bridge_finished {
        if let Err(e) = bridge_task.await {
            tracing::error!(plugin_id = %plugin_id, error = %e, "channel bridge task failed");
        }
    }
    if bridge_finished {
        // Let the writer send its close frame to the iframe.
        let _ = tokio::time::timeout(WRITER_DRAIN, &mut writer).await;
    }
    writer.abort();

    state.metrics.channel_closed();
    log_channel!(plugin_id = %plugin_id, %connection_id, "plugin channel closed");
}
