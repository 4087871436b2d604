use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::context::PluginContext;
use crate::plugin::{Plugin, PluginMetadata};

/// A registered plugin with the context it was initialized with.
#[derive(Clone)]
pub struct LoadedPlugin {
    plugin: Arc<dyn Plugin>,
    path: PathBuf,
    loaded_at: DateTime<Utc>,
    context: PluginContext,
}

impl LoadedPlugin {
    pub(crate) fn new(plugin: Arc<dyn Plugin>, path: PathBuf, context: PluginContext) -> Self {
        Self {
            plugin,
            path,
            loaded_at: Utc::now(),
            context,
        }
    }

    pub fn plugin(&self) -> &Arc<dyn Plugin> {
        &self.plugin
    }

    pub fn metadata(&self) -> &PluginMetadata {
        self.plugin.metadata()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub(crate) fn context(&self) -> &PluginContext {
        &self.context
    }

    pub fn info(&self) -> PluginInfo {
        PluginInfo {
            metadata: self.metadata().clone(),
            path: self.path.clone(),
            loaded_at: self.loaded_at,
        }
    }
}

/// Serializable snapshot of a loaded plugin.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginInfo {
    pub metadata: PluginMetadata,
    pub path: PathBuf,
    pub loaded_at: DateTime<Utc>,
}

/// Currently loaded plugins by name. Shared by the manager and every
/// context for dependency lookups.
#[derive(Default)]
pub struct PluginRegistry {
    entries: DashMap<String, LoadedPlugin>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, entry: LoadedPlugin) -> Option<LoadedPlugin> {
        self.entries.insert(entry.metadata().name.clone(), entry)
    }

    pub(crate) fn remove(&self, name: &str) -> Option<LoadedPlugin> {
        self.entries.remove(name).map(|(_, entry)| entry)
    }

    pub(crate) fn entry(&self, name: &str) -> Option<LoadedPlugin> {
        self.entries.get(name).map(|e| e.value().clone())
    }

    pub fn get_plugin(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.entries.get(name).map(|e| Arc::clone(&e.plugin))
    }

    pub fn info(&self, name: &str) -> Option<PluginInfo> {
        self.entries.get(name).map(|e| e.info())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Loaded plugins sorted by name.
    pub fn plugins(&self) -> Vec<Arc<dyn Plugin>> {
        let mut entries: Vec<(String, Arc<dyn Plugin>)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(&e.plugin)))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.into_iter().map(|(_, plugin)| plugin).collect()
    }

    pub fn find_by_path(&self, path: &Path) -> Option<Arc<dyn Plugin>> {
        self.entries
            .iter()
            .find(|e| e.path.as_path() == path)
            .map(|e| Arc::clone(&e.plugin))
    }

    /// Names ordered most recently loaded first, so dependents come before
    /// the plugins they depend on.
    pub fn unload_order(&self) -> Vec<String> {
        let mut entries: Vec<(DateTime<Utc>, String)> = self
            .entries
            .iter()
            .map(|e| (e.loaded_at, e.key().clone()))
            .collect();
        entries.sort_by(|a, b| b.cmp(a));
        entries.into_iter().map(|(_, name)| name).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}
