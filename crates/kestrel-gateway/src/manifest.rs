//! Plugin manifest (plugin.toml) parsing and validation.
//!
//! A manifest names the plugin, gives it a version, and points at the entry
//! document the host loads into the plugin's sandboxed iframe:
//!
//! ```toml
//! [plugin]
//! name = "weather-widget"
//! version = "1.2.0"
//! description = "Local forecast"
//! entry = "index.html"
//!
//! [permissions]
//! topics = ["public:weather"]
//! ```

use std::path::Path;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::bus::is_public_topic;
use crate::error::GatewayError;
use crate::gateway::HOST_IDENTITY;

static NAME_PATTERN: LazyLock<regex_lite::Regex> = LazyLock::new(|| {
    regex_lite::Regex::new(r"^[a-z][a-z0-9-]*$").expect("plugin name pattern is valid")
});

/// A parsed and validated plugin manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Plugin metadata.
    pub plugin: PluginMeta,

    /// Declared bus usage.
    #[serde(default)]
    pub permissions: Permissions,
}

/// Plugin metadata from the [plugin] section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginMeta {
    /// Unique identifier, lowercase, kebab-case. Doubles as the plugin id.
    pub name: String,

    /// Semantic version string.
    pub version: String,

    /// Optional description for display.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Iframe entry document, relative to plugin.toml or absolute URL.
    pub entry: String,
}

/// The [permissions] section.
///
/// Informational only: the bus enforces the `public:` namespace on every
/// call regardless of what a manifest declares.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default)]
    pub topics: Vec<String>,
}

impl PluginManifest {
    /// Parse a plugin manifest from TOML content.
    pub fn from_toml(content: &str) -> Result<Self, GatewayError> {
        let manifest: Self = toml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Read and parse a manifest file.
    pub fn from_path(path: &Path) -> Result<Self, GatewayError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// The identity the plugin runs under.
    pub fn id(&self) -> &str {
        &self.plugin.name
    }

    /// Validate the manifest fields.
    pub(crate) fn validate(&self) -> Result<(), GatewayError> {
        if self.plugin.name.is_empty() || self.plugin.name.len() > 64 {
            return Err(GatewayError::ManifestValidation(
                "plugin name must be 1-64 characters".into(),
            ));
        }

        if !NAME_PATTERN.is_match(&self.plugin.name) {
            return Err(GatewayError::ManifestValidation(
                "plugin name must be lowercase, kebab-case (^[a-z][a-z0-9-]*$)".into(),
            ));
        }

        if self.plugin.name == HOST_IDENTITY {
            return Err(GatewayError::ManifestValidation(format!(
                "plugin name is reserved: {}",
                self.plugin.name
            )));
        }

        if semver::Version::parse(&self.plugin.version).is_err() {
            return Err(GatewayError::ManifestValidation(format!(
                "invalid semver version: {}",
                self.plugin.version
            )));
        }

        if let Some(desc) = &self.plugin.description {
            if desc.chars().count() > 256 {
                return Err(GatewayError::ManifestValidation(
                    "description must be at most 256 characters".into(),
                ));
            }
        }

        if self.plugin.entry.trim().is_empty() {
            return Err(GatewayError::ManifestValidation(
                "entry cannot be empty".into(),
            ));
        }

        if let Some(topic) = self.permissions.topics.iter().find(|t| !is_public_topic(t)) {
            return Err(GatewayError::ManifestValidation(format!(
                "declared topic outside the public namespace: {}",
                topic
            )));
        }

        Ok(())
    }
}
