//! Resolving plugin paths into plugin instances.

mod discovery;
mod factory;
mod manifest;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

pub use discovery::ManifestDiscovery;
pub use factory::{FactoryLoader, PluginFactory};
pub use manifest::{DEFAULT_MANIFEST_FILE, PluginManifest};

use crate::error::Result;
use crate::plugin::{Plugin, PluginMetadata};

/// Turns a path into a plugin.
///
/// `load` must return a fresh instance on every call; the host never caches
/// plugins across an unload.
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    async fn load(&self, path: &Path) -> Result<Arc<dyn Plugin>>;

    /// Reads metadata without constructing or initializing the plugin.
    async fn read_metadata(&self, path: &Path) -> Result<PluginMetadata>;

    /// Candidate plugin paths inside `dir`, in a deterministic order.
    async fn discover(&self, dir: &Path) -> Result<Vec<PathBuf>>;
}
