//! Loaded plugin listing.

use axum::{extract::State, Json};
use serde::Serialize;

use super::router::AppState;

#[derive(Serialize)]
pub struct PluginSummary {
    pub id: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub entry: String,
    pub topics: Vec<String>,
    /// Whether the plugin currently has an open channel.
    pub connected: bool,
}

/// GET /__kestrel/plugins
pub async fn list_plugins(State(state): State<AppState>) -> Json<Vec<PluginSummary>> {
    let gateway = &state.gateway;
    let plugins = gateway
        .registry()
        .list()
        .into_iter()
        .map(|manifest| PluginSummary {
            id: manifest.id().to_string(),
            version: manifest.plugin.version.clone(),
            description: manifest.plugin.description.clone(),
            entry: manifest.plugin.entry.clone(),
            topics: manifest.permissions.topics.clone(),
            connected: gateway.ports().is_attached(manifest.id()),
        })
        .collect();
    Json(plugins)
}
