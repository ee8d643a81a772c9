//! Prometheus metrics registry.

use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge, histogram::Histogram},
    registry::Registry,
};

/// Duration histogram buckets (in seconds).
/// Covers 1ms up to just past the default 2s call timeout.
const DURATION_BUCKETS: [f64; 11] = [
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 2.5,
];

/// Capability call labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CallLabels {
    pub plugin: String,
    pub method: String,
    pub outcome: String,
}

/// Call duration labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct MethodLabels {
    pub method: String,
}

/// Batch rejection labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RejectionLabels {
    pub plugin: String,
    pub reason: String,
}

/// HTTP admission labels. The caller-chosen scope is not a label.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct AppLabels {
    pub app: String,
}

/// Topic bus labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct BusLabels {
    pub outcome: String,
}

/// HTTP request labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    pub method: String,
    pub path: String,
    pub status: u16,
}

/// Metrics registry holding all gateway metrics.
pub struct MetricsRegistry {
    /// The prometheus-client registry for encoding.
    pub registry: Registry,

    // Capability calls
    pub capability_calls_total: Family<CallLabels, Counter>,
    pub capability_call_duration_seconds: Family<MethodLabels, Histogram>,

    // Admission
    pub batches_rejected_total: Family<RejectionLabels, Counter>,
    pub http_rate_limited_total: Family<AppLabels, Counter>,

    // Bus
    pub bus_events_total: Family<BusLabels, Counter>,

    // Channels
    pub active_channels: Gauge,
    pub channels_total: Counter,

    // HTTP
    pub http_requests_total: Family<RequestLabels, Counter>,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all metrics registered.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let capability_calls_total = Family::<CallLabels, Counter>::default();
        registry.register(
            "kestrel_capability_calls",
            "Total number of capability calls executed",
            capability_calls_total.clone(),
        );

        let capability_call_duration_seconds =
            Family::<MethodLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(DURATION_BUCKETS.iter().cloned())
            });
        registry.register(
            "kestrel_capability_call_duration_seconds",
            "Capability call duration in seconds",
            capability_call_duration_seconds.clone(),
        );

        let batches_rejected_total = Family::<RejectionLabels, Counter>::default();
        registry.register(
            "kestrel_batches_rejected",
            "Total number of batches rejected at admission",
            batches_rejected_total.clone(),
        );

        let http_rate_limited_total = Family::<AppLabels, Counter>::default();
        registry.register(
            "kestrel_http_rate_limited",
            "Total number of HTTP requests refused by the appId:scope limiter",
            http_rate_limited_total.clone(),
        );

        let bus_events_total = Family::<BusLabels, Counter>::default();
        registry.register(
            "kestrel_bus_events",
            "Total number of topic bus publishes by outcome",
            bus_events_total.clone(),
        );

        let active_channels = Gauge::default();
        registry.register(
            "kestrel_active_channels",
            "Number of currently open plugin channels",
            active_channels.clone(),
        );

        let channels_total = Counter::default();
        registry.register(
            "kestrel_channels",
            "Total number of plugin channels opened",
            channels_total.clone(),
        );

        let http_requests_total = Family::<RequestLabels, Counter>::default();
        registry.register(
            "kestrel_http_requests",
            "Total number of HTTP requests processed",
            http_requests_total.clone(),
        );

        Self {
            registry,
            capability_calls_total,
            capability_call_duration_seconds,
            batches_rejected_total,
            http_rate_limited_total,
            bus_events_total,
            active_channels,
            channels_total,
            http_requests_total,
        }
    }

    /// Record an executed capability call.
    ///
    /// `method` becomes a label value; callers pass only known method names.
    pub fn record_call(&self, plugin: &str, method: &str, ok: bool, duration_secs: f64) {
        let labels = CallLabels {
            plugin: plugin.to_string(),
            method: method.to_string(),
            outcome: if ok { "ok" } else { "error" }.to_string(),
        };
        self.capability_calls_total.get_or_create(&labels).inc();
        self.capability_call_duration_seconds
            .get_or_create(&MethodLabels {
                method: method.to_string(),
            })
            .observe(duration_secs);
    }

    /// Record a batch rejected by an admission gate.
    pub fn record_batch_rejected(&self, plugin: &str, reason: &str) {
        let labels = RejectionLabels {
            plugin: plugin.to_string(),
            reason: reason.to_string(),
        };
        self.batches_rejected_total.get_or_create(&labels).inc();
    }

    /// Record an HTTP request refused by the coarse limiter.
    pub fn record_http_rate_limited(&self, app: &str) {
        let labels = AppLabels {
            app: app.to_string(),
        };
        self.http_rate_limited_total.get_or_create(&labels).inc();
    }

    /// Record a bus publish by outcome (`published` or `failed`).
    pub fn record_bus_event(&self, outcome: &str) {
        self.bus_events_total
            .get_or_create(&BusLabels {
                outcome: outcome.to_string(),
            })
            .inc();
    }

    /// Record a completed HTTP request.
    pub fn record_request(&self, method: &str, path: &str, status: u16) {
        let labels = RequestLabels {
            method: method.to_string(),
            path: path.to_string(),
            status,
        };
        self.http_requests_total.get_or_create(&labels).inc();
    }

    /// A plugin channel was opened.
    pub fn channel_opened(&self) {
        self.active_channels.inc();
        self.channels_total.inc();
    }

    /// A plugin channel was closed.
    pub fn channel_closed(&self) {
        self.active_channels.dec();
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
