use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::error::{PluginError, Result};
use crate::plugin::{Plugin, PluginMetadata};

/// Lifecycle notification broadcast by the manager.
#[derive(Clone)]
pub enum ManagerEvent {
    PluginLoaded(Arc<dyn Plugin>),
    PluginUnloaded(PluginMetadata),
    PluginError {
        error: Arc<PluginError>,
        metadata: Option<PluginMetadata>,
    },
}

impl ManagerEvent {
    pub fn plugin_name(&self) -> Option<&str> {
        match self {
            ManagerEvent::PluginLoaded(plugin) => Some(plugin.name()),
            ManagerEvent::PluginUnloaded(metadata) => Some(&metadata.name),
            ManagerEvent::PluginError { error, metadata } => metadata
                .as_ref()
                .map(|m| m.name.as_str())
                .or_else(|| error.plugin_name()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ManagerEvent::PluginError { .. })
    }
}

impl std::fmt::Debug for ManagerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManagerEvent::PluginLoaded(plugin) => {
                f.debug_tuple("PluginLoaded").field(&plugin.name()).finish()
            }
            ManagerEvent::PluginUnloaded(metadata) => {
                f.debug_tuple("PluginUnloaded").field(&metadata.name).finish()
            }
            ManagerEvent::PluginError { error, metadata } => f
                .debug_struct("PluginError")
                .field("error", error)
                .field("plugin", &metadata.as_ref().map(|m| &m.name))
                .finish(),
        }
    }
}

/// A reload started by an override change.
///
/// Dropping the handle leaves the reload running; its failure is still
/// broadcast as [`ManagerEvent::PluginError`]. A plugin unloaded before the
/// reload runs stays unloaded.
pub struct ReloadHandle {
    plugin: String,
    path: PathBuf,
    task: JoinHandle<Result<Option<Arc<dyn Plugin>>>>,
}

impl ReloadHandle {
    pub(crate) fn new(
        plugin: String,
        path: PathBuf,
        task: JoinHandle<Result<Option<Arc<dyn Plugin>>>>,
    ) -> Self {
        Self { plugin, path, task }
    }

    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the reload and returns the new instance, or `None` if the
    /// plugin was unloaded before the reload ran.
    pub async fn wait(self) -> Result<Option<Arc<dyn Plugin>>> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(PluginError::LoadFailed {
                path: self.path,
                source: Box::new(e),
            }),
        }
    }
}

impl std::fmt::Debug for ReloadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadHandle")
            .field("plugin", &self.plugin)
            .field("path", &self.path)
            .field("finished", &self.is_finished())
            .finish()
    }
}
