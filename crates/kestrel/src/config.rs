//! Host configuration (`kestrel.toml`).
//!
//! Every field has a default, so an absent file and an empty file behave the
//! same. Command-line flags are applied on top by `main`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use kestrel_gateway::{BatchLimits, BucketLimits};
use kestrel_telemetry::TelemetryConfig;
use serde::Deserialize;
use thiserror::Error;

/// Default listen address.
pub const DEFAULT_LISTEN: &str = "127.0.0.1:7400";

/// Outbound frames buffered per plugin channel before bus events drop.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete host configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KestrelConfig {
    /// Socket address to listen on.
    pub listen: String,

    /// Directory scanned for `<name>/plugin.toml` at startup.
    pub plugins_dir: Option<PathBuf>,

    /// Outbound buffer per plugin channel.
    pub channel_capacity: usize,

    /// Dispatcher admission limits.
    pub batch: BatchLimits,

    /// Coarse HTTP bucket keyed by `appId:scope`.
    pub http_rate: BucketLimits,

    /// Logging setup.
    pub telemetry: TelemetryConfig,

    /// Metric series served to `metrics.read.getSeries`, as
    /// `id = [[timestamp, value], ...]`.
    pub series: BTreeMap<String, Vec<(f64, f64)>>,
}

impl Default for KestrelConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            plugins_dir: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            batch: BatchLimits::default(),
            http_rate: BucketLimits::http(),
            telemetry: TelemetryConfig::default(),
            series: BTreeMap::new(),
        }
    }
}

impl KestrelConfig {
    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or return defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content, path)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "channel_capacity must be at least 1".into(),
            ));
        }
        if self.batch.max_calls == 0 {
            return Err(ConfigError::Invalid("batch.max_calls must be at least 1".into()));
        }
        for (name, bucket) in [("batch.rate", self.batch.rate), ("http_rate", self.http_rate)] {
            let refill = bucket.refill_per_sec;
            if bucket.capacity == 0 || refill.is_nan() || refill < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{} needs a positive capacity and a non-negative refill rate",
                    name
                )));
            }
        }
        for (id, points) in &self.series {
            if id.is_empty() || id.len() > 128 {
                return Err(ConfigError::Invalid(format!(
                    "series id must be 1 to 128 characters: {:?}",
                    id
                )));
            }
            if points.iter().any(|(t, v)| !t.is_finite() || !v.is_finite()) {
                return Err(ConfigError::Invalid(format!(
                    "series {} has a non-finite point",
                    id
                )));
            }
        }
        Ok(())
    }
}
