//! Loaded plugins, keyed by identity.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::GatewayError;
use crate::manifest::PluginManifest;

/// File name of a plugin manifest inside its directory.
pub const MANIFEST_FILE: &str = "plugin.toml";

/// Registry of loaded plugin manifests.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: DashMap<String, Arc<PluginManifest>>,
}

impl PluginRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin. Its manifest name becomes its id.
    ///
    /// The manifest is validated again, since its fields are public and may
    /// have changed after parsing.
    pub fn load(&self, manifest: PluginManifest) -> Result<Arc<PluginManifest>, GatewayError> {
        manifest.validate()?;
        let id = manifest.id().to_string();
        match self.plugins.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                Err(GatewayError::AlreadyLoaded(entry.key().clone()))
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let manifest = Arc::new(manifest);
                entry.insert(manifest.clone());
                Ok(manifest)
            }
        }
    }

    /// Remove a plugin, returning its manifest if it was loaded.
    pub fn unload(&self, plugin_id: &str) -> Option<Arc<PluginManifest>> {
        self.plugins.remove(plugin_id).map(|(_, manifest)| manifest)
    }

    /// Load every plugin found under `dir` (see [`scan_dir`]).
    ///
    /// All or nothing: manifests are parsed and their names checked against
    /// each other and the registry before any is registered. A concurrent
    /// load that takes one of the names in between rolls the batch back.
    pub fn load_dir(&self, dir: &Path) -> Result<Vec<Arc<PluginManifest>>, GatewayError> {
        let manifests = scan_dir(dir)?;

        let mut names = HashSet::new();
        for manifest in &manifests {
            if !names.insert(manifest.id()) || self.contains(manifest.id()) {
                return Err(GatewayError::AlreadyLoaded(manifest.id().to_string()));
            }
        }

        let mut loaded = Vec::with_capacity(manifests.len());
        for manifest in manifests {
            match self.load(manifest) {
                Ok(manifest) => loaded.push(manifest),
                Err(e) => {
                    for manifest in &loaded {
                        self.unload(manifest.id());
                    }
                    return Err(e);
                }
            }
        }
        Ok(loaded)
    }

    /// Look up a loaded plugin.
    pub fn get(&self, plugin_id: &str) -> Option<Arc<PluginManifest>> {
        self.plugins.get(plugin_id).map(|m| m.value().clone())
    }

    /// Whether `plugin_id` is loaded.
    pub fn contains(&self, plugin_id: &str) -> bool {
        self.plugins.contains_key(plugin_id)
    }

    /// All loaded plugins, sorted by id.
    pub fn list(&self) -> Vec<Arc<PluginManifest>> {
        let mut plugins: Vec<_> = self.plugins.iter().map(|m| m.value().clone()).collect();
        plugins.sort_by(|a, b| a.id().cmp(b.id()));
        plugins
    }

    /// Number of loaded plugins.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether no plugin is loaded.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

/// Read every `<dir>/*/plugin.toml`, sorted by directory name.
///
/// Subdirectories without a manifest are skipped. The first unreadable or
/// invalid manifest aborts the scan.
pub fn scan_dir(dir: &Path) -> Result<Vec<PluginManifest>, GatewayError> {
    let mut candidates = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            let manifest_path = path.join(MANIFEST_FILE);
            if manifest_path.is_file() {
                candidates.push(manifest_path);
            }
        }
    }
    candidates.sort();

    candidates
        .iter()
        .map(|path| {
            PluginManifest::from_path(path).map_err(|e| match e {
                GatewayError::ManifestParse(msg) => {
                    GatewayError::ManifestParse(format!("{}: {}", path.display(), msg))
                }
                GatewayError::ManifestValidation(msg) => {
                    GatewayError::ManifestValidation(format!("{}: {}", path.display(), msg))
                }
                other => other,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn manifest(name: &str) -> PluginManifest {
        PluginManifest::from_toml(&format!(
            "[plugin]\nname = \"{}\"\nversion = \"1.0.0\"\nentry = \"index.html\"\n",
            name
        ))
        .unwrap()
    }

    fn write_plugin(dir: &Path, folder: &str, body: &str) {
        let plugin_dir = dir.join(folder);
        fs::create_dir_all(&plugin_dir).unwrap();
        fs::write(plugin_dir.join(MANIFEST_FILE), body).unwrap();
    }

    #[test]
    fn load_get_unload() {
        let registry = PluginRegistry::new();
        registry.load(manifest("clock")).unwrap();

        assert!(registry.contains("clock"));
        assert_eq!(registry.get("clock").unwrap().plugin.version, "1.0.0");
        assert!(registry.unload("clock").is_some());
        assert!(registry.unload("clock").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn duplicate_load_is_rejected() {
        let registry = PluginRegistry::new();
        registry.load(manifest("clock")).unwrap();
        let err = registry.load(manifest("clock")).unwrap_err();
        assert!(matches!(err, GatewayError::AlreadyLoaded(id) if id == "clock"));
    }

    #[test]
    fn list_is_sorted() {
        let registry = PluginRegistry::new();
        for name in ["weather", "clock", "notes"] {
            registry.load(manifest(name)).unwrap();
        }
        let ids: Vec<String> = registry.list().iter().map(|m| m.id().to_string()).collect();
        assert_eq!(ids, vec!["clock", "notes", "weather"]);
    }

    #[test]
    fn scan_dir_reads_plugin_folders() {
        let dir = tempfile::tempdir().unwrap();
        write_plugin(
            dir.path(),
            "b",
            "[plugin]\nname = \"beta\"\nversion = \"0.2.0\"\nentry = \"index.html\"\n",
        );
        write_plugin(
            dir.path(),
            "a",
            "[plugin]\nname = \"alpha\"\nversion = \"0.1.0\"\nentry = \"index.html\"\n",
        );
        fs::create_dir_all(dir.path().join("empty")).unwrap();
        fs::write(dir.path().join("README.md"), "not a plugin").unwrap();

        let manifests = scan_dir(dir.path()).unwrap();
        let names: Vec<&str> = manifests.iter().map(|m| m.id()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[test]
    fn load_dir_registers_everything() {
        let dir = tempfile::tempdir().unwrap();
        write_plugin(
            dir.path(),
            "clock",
            "[plugin]\nname = \"clock\"\nversion = \"1.0.0\"\nentry = \"index.html\"\n",
        );

        let registry = PluginRegistry::new();
        let loaded = registry.load_dir(dir.path()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(registry.contains("clock"));
    }

    fn plugin_toml(name: &str) -> String {
        format!(
            "[plugin]\nname = \"{}\"\nversion = \"1.0.0\"\nentry = \"index.html\"\n",
            name
        )
    }

    #[test]
    fn load_dir_with_duplicate_names_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write_plugin(dir.path(), "a", &plugin_toml("alpha"));
        write_plugin(dir.path(), "b", &plugin_toml("alpha"));
        write_plugin(dir.path(), "c", &plugin_toml("gamma"));

        let registry = PluginRegistry::new();
        let err = registry.load_dir(dir.path()).unwrap_err();
        assert!(matches!(err, GatewayError::AlreadyLoaded(id) if id == "alpha"));
        assert!(registry.is_empty());
    }

    #[test]
    fn load_dir_clashing_with_a_loaded_plugin_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write_plugin(dir.path(), "a", &plugin_toml("alpha"));
        write_plugin(dir.path(), "b", &plugin_toml("beta"));

        let registry = PluginRegistry::new();
        registry.load(manifest("beta")).unwrap();

        let err = registry.load_dir(dir.path()).unwrap_err();
        assert!(matches!(err, GatewayError::AlreadyLoaded(id) if id == "beta"));
        assert!(!registry.contains("alpha"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn scan_dir_reports_bad_manifest_path() {
        let dir = tempfile::tempdir().unwrap();
        write_plugin(
            dir.path(),
            "broken",
            "[plugin]\nname = \"Broken\"\nversion = \"1.0.0\"\nentry = \"index.html\"\n",
        );

        let err = scan_dir(dir.path()).unwrap_err();
        assert!(err.to_string().contains("broken"));
        assert!(matches!(err, GatewayError::ManifestValidation(_)));
    }

    #[test]
    fn scan_missing_dir_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = scan_dir(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, GatewayError::Io(_)));
    }
}
