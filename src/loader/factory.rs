use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use super::{DEFAULT_MANIFEST_FILE, ManifestDiscovery, ModuleLoader, PluginManifest};
use crate::error::{PluginError, Result};
use crate::plugin::{Plugin, PluginMetadata};

pub type PluginFactory = Arc<dyn Fn(PluginMetadata) -> Arc<dyn Plugin> + Send + Sync>;

/// Loader backed by factories compiled into the host, selected by the
/// manifest's `entry`.
///
/// Every `load` re-reads the manifest and calls the factory again, so a
/// reload always sees current metadata and a fresh instance.
pub struct FactoryLoader {
    factories: DashMap<String, PluginFactory>,
    manifest_file: String,
}

impl FactoryLoader {
    pub fn new() -> Self {
        Self {
            factories: DashMap::new(),
            manifest_file: DEFAULT_MANIFEST_FILE.to_string(),
        }
    }

    pub fn with_manifest_file(mut self, manifest_file: impl Into<String>) -> Self {
        self.manifest_file = manifest_file.into();
        self
    }

    pub fn with_factory<F>(self, entry: impl Into<String>, factory: F) -> Self
    where
        F: Fn(PluginMetadata) -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        self.register(entry, factory);
        self
    }

    /// Registers `factory` under `entry`, replacing any previous one.
    pub fn register<F>(&self, entry: impl Into<String>, factory: F)
    where
        F: Fn(PluginMetadata) -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        self.factories.insert(entry.into(), Arc::new(factory));
    }

    pub fn unregister(&self, entry: &str) -> bool {
        self.factories.remove(entry).is_some()
    }

    pub fn entries(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn manifest_file(&self) -> &str {
        &self.manifest_file
    }
}

impl Default for FactoryLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FactoryLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactoryLoader")
            .field("entries", &self.entries())
            .field("manifest_file", &self.manifest_file)
            .finish()
    }
}

#[async_trait]
impl ModuleLoader for FactoryLoader {
    async fn load(&self, path: &Path) -> Result<Arc<dyn Plugin>> {
        let manifest = PluginManifest::load(path, &self.manifest_file).await?;
        let factory = self
            .factories
            .get(manifest.entry_name())
            .map(|f| Arc::clone(f.value()))
            .ok_or_else(|| {
                PluginError::invalid_format(
                    path,
                    format!("no plugin factory registered for '{}'", manifest.entry_name()),
                )
            })?;

        let plugin = factory(manifest.metadata.clone());
        if plugin.metadata().name != manifest.metadata.name {
            return Err(PluginError::invalid_format(
                path,
                format!(
                    "factory '{}' produced plugin '{}' for manifest '{}'",
                    manifest.entry_name(),
                    plugin.metadata().name,
                    manifest.metadata.name
                ),
            ));
        }
        Ok(plugin)
    }

    async fn read_metadata(&self, path: &Path) -> Result<PluginMetadata> {
        Ok(PluginManifest::load(path, &self.manifest_file).await?.metadata)
    }

    async fn discover(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        ManifestDiscovery::discover(dir, &self.manifest_file).await
    }
}
