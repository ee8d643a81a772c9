//! In-memory host collaborators.
//!
//! The desktop shell normally owns metrics, alerts and the widget registry.
//! The standalone host keeps them in memory so the gateway can be driven end
//! to end.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use kestrel_gateway::{
    AlertSink, HostServices, MetricsStore, PluginAlert, SeriesRange, WidgetRegistry,
    WidgetShellRegistration,
};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

/// Alerts retained before the oldest are discarded.
const ALERT_HISTORY: usize = 500;

/// Time series keyed by metric id, as `(timestamp, value)` pairs.
#[derive(Debug, Default)]
pub struct SeriesStore {
    series: DashMap<String, Vec<(f64, f64)>>,
}

impl SeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the points of `id`. Points are kept sorted by timestamp.
    pub fn insert(&self, id: impl Into<String>, mut points: Vec<(f64, f64)>) {
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        self.series.insert(id.into(), points);
    }

    /// Points of `id` within `[from, to]`, keeping the first point of every
    /// `step`-wide bucket.
    fn sample(&self, id: &str, range: SeriesRange) -> Option<Vec<(f64, f64)>> {
        let points = self.series.get(id)?;
        let step = range.step.max(1) as f64;

        let mut last_bucket = None;
        let sampled = points
            .iter()
            .filter(|(t, _)| *t >= range.from && *t <= range.to)
            .filter(|(t, _)| {
                let bucket = ((t - range.from) / step).floor() as i64;
                if last_bucket == Some(bucket) {
                    false
                } else {
                    last_bucket = Some(bucket);
                    true
                }
            })
            .copied()
            .collect();
        Some(sampled)
    }
}

#[async_trait]
impl MetricsStore for SeriesStore {
    async fn get_metric_series(&self, id: &str, range: SeriesRange) -> anyhow::Result<Value> {
        let points = self
            .sample(id, range)
            .ok_or_else(|| anyhow::anyhow!("unknown series: {}", id))?;
        let points: Vec<[f64; 2]> = points.into_iter().map(|(t, v)| [t, v]).collect();
        Ok(json!({
            "id": id,
            "from": range.from,
            "to": range.to,
            "step": range.step,
            "points": points,
        }))
    }
}

/// An alert as stored by the host.
#[derive(Debug, Clone, Serialize)]
pub struct StoredAlert {
    pub id: Uuid,
    pub raised_at: DateTime<Utc>,
    #[serde(flatten)]
    pub alert: PluginAlert,
}

/// Bounded, newest-last alert history.
#[derive(Debug, Default)]
pub struct AlertLog {
    alerts: Mutex<VecDeque<StoredAlert>>,
}

impl AlertLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of retained alerts, oldest first.
    pub fn list(&self) -> Vec<StoredAlert> {
        self.alerts.lock().iter().cloned().collect()
    }
}

#[async_trait]
impl AlertSink for AlertLog {
    async fn raise_plugin_alert(&self, alert: PluginAlert) -> anyhow::Result<()> {
        tracing::warn!(
            source = %alert.source,
            severity = ?alert.severity,
            title = %alert.title,
            "plugin alert raised"
        );

        let mut alerts = self.alerts.lock();
        if alerts.len() == ALERT_HISTORY {
            alerts.pop_front();
        }
        alerts.push_back(StoredAlert {
            id: Uuid::new_v4(),
            raised_at: Utc::now(),
            alert,
        });
        Ok(())
    }
}

/// Widget shells keyed by widget id.
#[derive(Debug, Default)]
pub struct WidgetCatalog {
    widgets: DashMap<String, WidgetShellRegistration>,
}

impl WidgetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<WidgetShellRegistration> {
        self.widgets.get(id).map(|w| w.value().clone())
    }

    /// All widgets, sorted by id.
    pub fn list(&self) -> Vec<WidgetShellRegistration> {
        let mut widgets: Vec<_> = self.widgets.iter().map(|w| w.value().clone()).collect();
        widgets.sort_by(|a, b| a.id.cmp(&b.id));
        widgets
    }
}

#[async_trait]
impl WidgetRegistry for WidgetCatalog {
    async fn register_widget_shell(
        &self,
        registration: WidgetShellRegistration,
    ) -> anyhow::Result<()> {
        match self.widgets.entry(registration.id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                if entry.get().plugin_id != registration.plugin_id {
                    anyhow::bail!("widget id already taken: {}", registration.id);
                }
                entry.insert(registration);
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(registration);
            }
        }
        Ok(())
    }
}

/// The in-memory collaborators, kept together so the HTTP layer and tests
/// can inspect them.
#[derive(Clone, Default)]
pub struct InMemoryHost {
    pub series: Arc<SeriesStore>,
    pub alerts: Arc<AlertLog>,
    pub widgets: Arc<WidgetCatalog>,
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collaborator handles for the gateway.
    pub fn services(&self) -> HostServices {
        HostServices {
            metrics: self.series.clone(),
            alerts: self.alerts.clone(),
            widgets: self.widgets.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_gateway::{MountKind, Severity};

    fn widget(id: &str, plugin: &str) -> WidgetShellRegistration {
        WidgetShellRegistration {
            id: id.into(),
            name: "Clock".into(),
            mount_kind: MountKind::Iframe,
            plugin_id: Some(plugin.into()),
            size: None,
            category: "plugins".into(),
        }
    }

    #[tokio::test]
    async fn series_are_windowed_and_stepped() {
        let store = SeriesStore::new();
        store.insert(
            "cpu",
            vec![(0.0, 1.0), (5.0, 2.0), (10.0, 3.0), (12.0, 4.0), (25.0, 5.0), (40.0, 6.0)],
        );

        let value = store
            .get_metric_series(
                "cpu",
                SeriesRange {
                    from: 5.0,
                    to: 30.0,
                    step: 10,
                },
            )
            .await
            .unwrap();

        assert_eq!(value["points"], json!([[5.0, 2.0], [25.0, 5.0]]));
    }

    #[tokio::test]
    async fn unknown_series_is_an_error() {
        let store = SeriesStore::new();
        let err = store
            .get_metric_series(
                "nope",
                SeriesRange {
                    from: 0.0,
                    to: 1.0,
                    step: 1,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown series: nope");
    }

    #[tokio::test]
    async fn alert_history_is_bounded() {
        let log = AlertLog::new();
        for i in 0..ALERT_HISTORY + 3 {
            log.raise_plugin_alert(PluginAlert {
                severity: Severity::Info,
                title: format!("alert {}", i),
                details: None,
                source: "p".into(),
            })
            .await
            .unwrap();
        }

        let alerts = log.list();
        assert_eq!(alerts.len(), ALERT_HISTORY);
        assert_eq!(alerts[0].alert.title, "alert 3");
    }

    #[tokio::test]
    async fn widget_ids_belong_to_their_first_plugin() {
        let catalog = WidgetCatalog::new();
        catalog.register_widget_shell(widget("clock", "a")).await.unwrap();
        catalog.register_widget_shell(widget("clock", "a")).await.unwrap();

        let err = catalog
            .register_widget_shell(widget("clock", "b"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already taken"));
        assert_eq!(catalog.get("clock").unwrap().plugin_id.as_deref(), Some("a"));
        assert_eq!(catalog.list().len(), 1);
    }
}
