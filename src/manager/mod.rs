//! Plugin lifecycle manager.
//!
//! Per plugin name the lifecycle is `Absent -> Loading -> Loaded ->
//! Unloading -> Absent`. Transitions are serialized through one async lock,
//! every validation step runs before any state changes, and each transition
//! is broadcast as a [`ManagerEvent`].

mod builder;
mod events;
mod registry;

pub use builder::PluginManagerBuilder;
pub use events::{ManagerEvent, ReloadHandle};
pub use registry::{LoadedPlugin, PluginInfo, PluginRegistry};

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;
use futures::future::join_all;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{Instrument, Span, debug, error, info, warn};

use crate::config::HostConfig;
use crate::context::ContextFactory;
use crate::dependency::{DependencyGraph, DependencyResolver};
use crate::error::{ErrorCategory, PluginError, Result};
use crate::events::EventBus;
use crate::loader::ModuleLoader;
use crate::naming;
use crate::observability::{HostMetrics, LifecycleTimer, MetricsSummary};
use crate::plugin::{Plugin, PluginMetadata};
use crate::resource::{self, ResourceOverrides};

/// Loads, unloads and reloads plugins and owns everything they share.
///
/// Cloning is cheap; clones drive the same set of plugins.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use plugin_host::{FactoryLoader, FnPlugin, Plugin, PluginManager};
///
/// # async fn example() -> plugin_host::Result<()> {
/// let loader = FactoryLoader::new().with_factory("audit", |metadata| {
///     Arc::new(FnPlugin::new(metadata)) as Arc<dyn Plugin>
/// });
/// let manager = PluginManager::new(Arc::new(loader));
///
/// let mut events = manager.subscribe();
/// manager.load_plugin("plugins/audit", None).await?;
/// println!("{:?}", events.recv().await);
///
/// manager.unload_all().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PluginManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: HostConfig,
    loader: Arc<dyn ModuleLoader>,
    registry: Arc<PluginRegistry>,
    graph: Mutex<DependencyGraph>,
    overrides: DashMap<String, ResourceOverrides>,
    // Source paths survive unload so a plugin can be reloaded later.
    paths: DashMap<String, PathBuf>,
    contexts: ContextFactory,
    notifications: broadcast::Sender<ManagerEvent>,
    transition: tokio::sync::Mutex<()>,
    metrics: Arc<HostMetrics>,
}

impl PluginManager {
    /// Manager with default configuration and no backing services.
    pub fn new(loader: Arc<dyn ModuleLoader>) -> Self {
        PluginManagerBuilder::new(loader).assemble()
    }

    pub fn builder(loader: Arc<dyn ModuleLoader>) -> PluginManagerBuilder {
        PluginManagerBuilder::new(loader)
    }

    /// Loads the plugin at `path`, replacing any loaded plugin of the same
    /// name.
    ///
    /// `overrides`, when given, are stored for the plugin and used for this
    /// and later loads; otherwise previously stored overrides apply.
    pub async fn load_plugin(
        &self,
        path: impl AsRef<Path>,
        overrides: Option<ResourceOverrides>,
    ) -> Result<Arc<dyn Plugin>> {
        let _transition = self.inner.transition.lock().await;
        self.load_locked(path.as_ref(), overrides).await
    }

    /// Unloads `name`; unloading a plugin that is not loaded does nothing.
    pub async fn unload_plugin(&self, name: &str) -> Result<()> {
        let _transition = self.inner.transition.lock().await;
        self.unload_locked(name).await
    }

    /// Unloads and loads `name` again from the path it was last loaded from.
    pub async fn reload_plugin(
        &self,
        name: &str,
        overrides: Option<ResourceOverrides>,
    ) -> Result<Arc<dyn Plugin>> {
        let _transition = self.inner.transition.lock().await;
        self.reload_locked(name, overrides).await
    }

    async fn reload_locked(
        &self,
        name: &str,
        overrides: Option<ResourceOverrides>,
    ) -> Result<Arc<dyn Plugin>> {
        let Some(path) = self.inner.paths.get(name).map(|p| p.value().clone()) else {
            let err = PluginError::PluginNotFound {
                name: name.to_string(),
            };
            self.notify_error(&err, None);
            return Err(err);
        };

        info!(plugin = %name, path = %path.display(), "Reloading plugin");
        if let Err(e) = self.unload_locked(name).await {
            warn!(plugin = %name, error = %e, "Previous instance failed to clean up before reload");
        }
        let plugin = self.load_locked(&path, overrides).await?;
        self.inner.metrics.reloads.inc();
        Ok(plugin)
    }

    /// Discovers plugins in `dir` and loads them dependencies first.
    ///
    /// Every plugin whose dependencies can be satisfied is loaded; if any
    /// remain, the call then fails with [`PluginError::DependencyResolution`]
    /// naming all of them. Returns the loaded names in load order.
    pub async fn load_plugins_from_directory(&self, dir: impl AsRef<Path>) -> Result<Vec<String>> {
        let dir = dir.as_ref();
        let _transition = self.inner.transition.lock().await;

        let pending = match self.read_directory(dir).await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Plugin discovery failed");
                self.notify_error(&e, None);
                return Err(e);
            }
        };
        let metadata: Vec<PluginMetadata> = pending.iter().map(|(_, m)| m.clone()).collect();
        let loaded: HashSet<String> = self.inner.registry.names().into_iter().collect();
        let plan = DependencyResolver::plan(&metadata, &loaded);
        debug!(
            dir = %dir.display(),
            discovered = pending.len(),
            resolvable = plan.order.len(),
            "Planned directory load"
        );

        let mut names = Vec::with_capacity(plan.order.len());
        for &index in &plan.order {
            let (path, _) = &pending[index];
            let plugin = self.load_locked(path, None).await?;
            names.push(plugin.name().to_string());
        }

        if !plan.is_complete() {
            let err = PluginError::DependencyResolution {
                unresolved: plan.unresolved,
            };
            warn!(dir = %dir.display(), error = %err, "Some plugins could not be loaded");
            self.notify_error(&err, None);
            return Err(err);
        }

        info!(dir = %dir.display(), count = names.len(), "Loaded plugins from directory");
        Ok(names)
    }

    /// Loads the configured plugins directory, if one is set.
    pub async fn load_configured_plugins(&self) -> Result<Vec<String>> {
        match &self.inner.config.plugins_dir {
            Some(dir) => self.load_plugins_from_directory(dir.clone()).await,
            None => Ok(Vec::new()),
        }
    }

    /// Unloads every plugin concurrently, most recently loaded first.
    ///
    /// A failing unload does not stop the others; all failures are returned
    /// together.
    pub async fn unload_all(&self) -> Result<()> {
        let _transition = self.inner.transition.lock().await;
        let names = self.inner.registry.unload_order();
        info!(count = names.len(), "Unloading all plugins");

        let results = join_all(names.iter().map(|name| self.unload_locked(name))).await;
        let errors: Vec<PluginError> = results.into_iter().filter_map(|r| r.err()).collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(PluginError::Aggregate(errors))
        }
    }

    /// Runs the execute hook of a loaded plugin.
    pub async fn execute(&self, name: &str, input: Value) -> Result<Value> {
        let plugin = self
            .get_plugin(name)
            .ok_or_else(|| PluginError::PluginNotFound {
                name: name.to_string(),
            })?;
        plugin
            .execute(input)
            .await
            .map_err(|e| match e.downcast::<PluginError>() {
                Ok(err) => *err,
                Err(source) => PluginError::ExecuteFailed {
                    plugin: name.to_string(),
                    source,
                },
            })
    }

    pub fn get_plugin(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.inner.registry.get_plugin(name)
    }

    pub fn get_all_plugins(&self) -> Vec<Arc<dyn Plugin>> {
        self.inner.registry.plugins()
    }

    pub fn get_plugin_names(&self) -> Vec<String> {
        self.inner.registry.names()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.inner.registry.contains(name)
    }

    pub fn plugin_info(&self, name: &str) -> Option<PluginInfo> {
        self.inner.registry.info(name)
    }

    pub fn find_plugin_by_path(&self, path: impl AsRef<Path>) -> Option<Arc<dyn Plugin>> {
        self.inner.registry.find_by_path(path.as_ref())
    }

    /// Dependencies currently recorded for a loaded plugin.
    pub fn dependencies_of(&self, name: &str) -> Vec<String> {
        self.graph().dependencies_of(name).to_vec()
    }

    /// Loaded plugins that declared `name` as a dependency.
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        self.graph().dependents_of(name)
    }

    /// Stores overrides for `name` and, if it is loaded, reloads it in the
    /// background.
    ///
    /// Returns the reload handle when a reload was started. A failed reload
    /// is only reported through [`subscribe`](Self::subscribe) unless the
    /// handle is awaited.
    pub fn set_plugin_resource_overrides(
        &self,
        name: &str,
        overrides: ResourceOverrides,
    ) -> Result<Option<ReloadHandle>> {
        naming::validate_plugin_name(name).map_err(|e| e.for_plugin(name))?;
        overrides.validate().map_err(|e| e.for_plugin(name))?;
        self.inner.overrides.insert(name.to_string(), overrides);
        debug!(plugin = %name, "Resource overrides set");
        Ok(self.schedule_reload(name))
    }

    pub fn get_plugin_resource_overrides(&self, name: &str) -> Option<ResourceOverrides> {
        self.inner.overrides.get(name).map(|o| o.value().clone())
    }

    /// Drops stored overrides for `name` and, if it is loaded, reloads it in
    /// the background with its declared resources.
    pub fn clear_plugin_resource_overrides(&self, name: &str) -> Option<ReloadHandle> {
        if self.inner.overrides.remove(name).is_some() {
            debug!(plugin = %name, "Resource overrides cleared");
        }
        self.schedule_reload(name)
    }

    /// Receiver for lifecycle notifications sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.inner.notifications.subscribe()
    }

    /// Host-side handle to the bus shared with every plugin.
    pub fn event_bus(&self) -> &EventBus {
        &self.inner.contexts.bus
    }

    pub fn metrics(&self) -> MetricsSummary {
        self.inner.metrics.summary()
    }

    pub fn config(&self) -> &HostConfig {
        &self.inner.config
    }

    async fn read_directory(&self, dir: &Path) -> Result<Vec<(PathBuf, PluginMetadata)>> {
        let paths = self.inner.loader.discover(dir).await?;
        let mut pending = Vec::with_capacity(paths.len());
        for path in paths {
            let metadata = self.inner.loader.read_metadata(&path).await?;
            pending.push((path, metadata));
        }
        Ok(pending)
    }

    async fn load_locked(
        &self,
        path: &Path,
        overrides: Option<ResourceOverrides>,
    ) -> Result<Arc<dyn Plugin>> {
        let timer = LifecycleTimer::start("load", &path.display().to_string());
        let mut metadata = None;
        let result = self
            .try_load(path, overrides, &mut metadata)
            .instrument(timer.span().clone())
            .await;
        let elapsed = timer.finish(result.is_ok());
        self.inner.metrics.record_load(result.is_ok(), elapsed);

        match result {
            Ok(plugin) => {
                info!(
                    plugin = %plugin.name(),
                    version = %plugin.metadata().version,
                    path = %path.display(),
                    duration_ms = elapsed,
                    "Plugin loaded"
                );
                self.notify(ManagerEvent::PluginLoaded(Arc::clone(&plugin)));
                Ok(plugin)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Plugin load failed");
                self.notify_error(&e, metadata);
                Err(e)
            }
        }
    }

    async fn try_load(
        &self,
        path: &Path,
        overrides: Option<ResourceOverrides>,
        seen: &mut Option<PluginMetadata>,
    ) -> Result<Arc<dyn Plugin>> {
        let plugin = self
            .inner
            .loader
            .load(path)
            .await
            .map_err(|e| match e.category() {
                ErrorCategory::Validation => e,
                _ => PluginError::LoadFailed {
                    path: path.to_path_buf(),
                    source: Box::new(e),
                },
            })?;
        let metadata = plugin.metadata().clone();
        *seen = Some(metadata.clone());
        metadata.check_format(path)?;

        let name = metadata.name.clone();
        Span::current().record("plugin", name.as_str());

        let effective = overrides
            .clone()
            .or_else(|| self.get_plugin_resource_overrides(&name));
        naming::validate_plugin_name(&name).map_err(|e| e.for_plugin(&name))?;
        resource::validate_declarations(&metadata, effective.as_ref())?;
        DependencyResolver::validate(&name, &metadata.dependencies, |d: &str| {
            self.inner.registry.contains(d)
        })?;
        {
            let graph = self.graph();
            DependencyResolver::check_circular(&name, &metadata.dependencies, &graph)?;
        }

        if self.inner.registry.contains(&name) {
            debug!(plugin = %name, "Replacing loaded instance");
            if let Err(e) = self.unload_locked(&name).await {
                warn!(plugin = %name, error = %e, "Previous instance failed to clean up");
            }
        }

        self.graph().insert(name.clone(), metadata.dependencies.clone());
        let context = self.inner.contexts.create(&metadata, effective.as_ref());
        if let Err(source) = plugin.initialize(context.clone()).await {
            context.liveness().invalidate();
            self.inner
                .contexts
                .listeners
                .teardown(&name, &self.inner.contexts.bus);
            self.graph().remove(&name);
            return Err(PluginError::LoadFailed {
                path: path.to_path_buf(),
                source,
            });
        }

        if let Some(overrides) = overrides {
            self.inner.overrides.insert(name.clone(), overrides);
        }
        self.inner.registry.insert(LoadedPlugin::new(
            Arc::clone(&plugin),
            path.to_path_buf(),
            context,
        ));
        self.inner.paths.insert(name, path.to_path_buf());
        Ok(plugin)
    }

    async fn unload_locked(&self, name: &str) -> Result<()> {
        let Some(entry) = self.inner.registry.entry(name) else {
            debug!(plugin = %name, "Unload requested for plugin that is not loaded");
            return Ok(());
        };

        let timer = LifecycleTimer::start("unload", name);
        let metadata = entry.metadata().clone();
        let result = self.teardown(&entry).instrument(timer.span().clone()).await;
        let elapsed = timer.finish(result.is_ok());
        self.inner.metrics.record_unload(result.is_ok(), elapsed);

        match result {
            Ok(()) => {
                info!(plugin = %name, duration_ms = elapsed, "Plugin unloaded");
                self.notify(ManagerEvent::PluginUnloaded(metadata));
                Ok(())
            }
            Err(e) => {
                warn!(plugin = %name, error = %e, "Plugin cleanup failed");
                self.notify_error(&e, Some(metadata));
                Err(e)
            }
        }
    }

    // Every step after cleanup runs even if cleanup fails, so the plugin
    // always leaves the registry.
    async fn teardown(&self, entry: &LoadedPlugin) -> Result<()> {
        let name = entry.metadata().name.clone();
        entry.context().liveness().invalidate();

        let cleanup = entry.plugin().cleanup().await;

        let removed = self
            .inner
            .contexts
            .listeners
            .teardown(&name, &self.inner.contexts.bus);
        debug!(plugin = %name, listeners = removed, "Removed event listeners");
        self.graph().remove(&name);
        self.inner.registry.remove(&name);

        cleanup.map_err(|source| PluginError::UnloadFailed {
            plugin: name,
            source,
        })
    }

    fn schedule_reload(&self, name: &str) -> Option<ReloadHandle> {
        if !self.inner.registry.contains(name) {
            return None;
        }
        let path = self.inner.paths.get(name).map(|p| p.value().clone())?;
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(plugin = %name, "No async runtime; overrides apply on the next reload");
            return None;
        };

        let manager = self.clone();
        let plugin = name.to_string();
        let task = runtime.spawn(async move {
            let result = manager.reload_if_loaded(&plugin).await;
            if let Err(e) = &result {
                error!(plugin = %plugin, error = %e, "Background reload failed");
            }
            result
        });
        debug!(plugin = %name, "Scheduled background reload");
        Some(ReloadHandle::new(name.to_string(), path, task))
    }

    // The plugin may have been unloaded between scheduling and running.
    async fn reload_if_loaded(&self, name: &str) -> Result<Option<Arc<dyn Plugin>>> {
        let _transition = self.inner.transition.lock().await;
        if !self.inner.registry.contains(name) {
            debug!(plugin = %name, "Plugin unloaded before background reload ran; skipping");
            return Ok(None);
        }
        self.reload_locked(name, None).await.map(Some)
    }

    fn graph(&self) -> MutexGuard<'_, DependencyGraph> {
        self.inner.graph.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify(&self, event: ManagerEvent) {
        // Err only means nobody is subscribed.
        let _ = self.inner.notifications.send(event);
    }

    fn notify_error(&self, error: &PluginError, metadata: Option<PluginMetadata>) {
        self.notify(ManagerEvent::PluginError {
            error: Arc::new(error.duplicate()),
            metadata,
        });
    }
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("plugins", &self.inner.registry.names())
            .field("overrides", &self.inner.overrides.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::loader::{FactoryLoader, PluginManifest};
    use crate::plugin::FnPlugin;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::{TempDir, tempdir};

    fn write_manifest(dir: &Path, metadata: PluginMetadata) -> PathBuf {
        let plugin_dir = dir.join(&metadata.name);
        std::fs::create_dir_all(&plugin_dir).unwrap();
        let manifest = PluginManifest::new(metadata).with_entry("basic");
        std::fs::write(
            plugin_dir.join("plugin.json"),
            serde_json::to_string(&manifest).unwrap(),
        )
        .unwrap();
        plugin_dir
    }

    fn basic_manager() -> (PluginManager, TempDir) {
        let loader = FactoryLoader::new().with_factory("basic", |metadata| {
            Arc::new(FnPlugin::new(metadata)) as Arc<dyn Plugin>
        });
        (PluginManager::new(Arc::new(loader)), tempdir().unwrap())
    }

    #[tokio::test]
    async fn test_load_and_unload() {
        let (manager, dir) = basic_manager();
        let path = write_manifest(dir.path(), PluginMetadata::new("alpha", "1.0.0"));
        let mut events = manager.subscribe();

        let plugin = manager.load_plugin(&path, None).await.unwrap();
        assert_eq!(plugin.name(), "alpha");
        assert!(manager.is_loaded("alpha"));
        assert_eq!(manager.get_plugin_names(), vec!["alpha"]);
        assert!(manager.find_plugin_by_path(&path).is_some());
        assert!(matches!(events.recv().await.unwrap(), ManagerEvent::PluginLoaded(_)));

        manager.unload_plugin("alpha").await.unwrap();
        assert!(!manager.is_loaded("alpha"));
        assert!(matches!(
            events.recv().await.unwrap(),
            ManagerEvent::PluginUnloaded(ref m) if m.name == "alpha"
        ));

        let metrics = manager.metrics();
        assert_eq!(metrics.loads, 1);
        assert_eq!(metrics.unloads, 1);
        assert_eq!(metrics.loaded_plugins, 0);
    }

    #[tokio::test]
    async fn test_unload_unknown_is_noop() {
        let (manager, _dir) = basic_manager();
        manager.unload_plugin("ghost").await.unwrap();
        assert_eq!(manager.metrics().unloads, 0);
    }

    #[tokio::test]
    async fn test_missing_dependency_leaves_state_untouched() {
        let (manager, dir) = basic_manager();
        let path = write_manifest(
            dir.path(),
            PluginMetadata::new("reports", "1.0.0").with_dependencies(["storage"]),
        );
        let mut events = manager.subscribe();

        let err = manager.load_plugin(&path, None).await.unwrap_err();
        assert!(matches!(
            err,
            PluginError::DependencyNotFound { ref dependency, .. } if dependency == "storage"
        ));
        assert!(manager.get_plugin_names().is_empty());
        assert!(manager.dependencies_of("reports").is_empty());
        assert!(matches!(
            events.recv().await.unwrap(),
            ManagerEvent::PluginError { ref metadata, .. } if metadata.as_ref().unwrap().name == "reports"
        ));
        assert_eq!(manager.metrics().load_failures, 1);
    }

    #[tokio::test]
    async fn test_initialize_failure_is_wrapped() {
        let loader = FactoryLoader::new().with_factory("broken", |metadata| {
            Arc::new(
                FnPlugin::builder(metadata)
                    .on_initialize(|context| {
                        async move {
                            context.event_bus().on("tick", |_| {})?;
                            Err::<(), BoxError>("database offline".into())
                        }
                        .boxed()
                    })
                    .build(),
            ) as Arc<dyn Plugin>
        });
        let manager = PluginManager::new(Arc::new(loader));
        let dir = tempdir().unwrap();
        let plugin_dir = dir.path().join("broken");
        std::fs::create_dir_all(&plugin_dir).unwrap();
        std::fs::write(
            plugin_dir.join("plugin.json"),
            r#"{"name":"broken","version":"1.0.0","entry":"broken"}"#,
        )
        .unwrap();

        let err = manager.load_plugin(&plugin_dir, None).await.unwrap_err();
        match err {
            PluginError::LoadFailed { path, source } => {
                assert_eq!(path, plugin_dir);
                assert_eq!(source.to_string(), "database offline");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!manager.is_loaded("broken"));
        assert_eq!(manager.event_bus().listener_count("tick"), 0);
    }

    #[tokio::test]
    async fn test_reload_unknown_plugin() {
        let (manager, _dir) = basic_manager();
        let err = manager.reload_plugin("never", None).await.unwrap_err();
        assert!(matches!(err, PluginError::PluginNotFound { ref name } if name == "never"));
    }

    #[tokio::test]
    async fn test_reload_after_unload_uses_remembered_path() {
        let (manager, dir) = basic_manager();
        let path = write_manifest(dir.path(), PluginMetadata::new("alpha", "1.0.0"));
        manager.load_plugin(&path, None).await.unwrap();
        manager.unload_plugin("alpha").await.unwrap();

        let plugin = manager.reload_plugin("alpha", None).await.unwrap();
        assert_eq!(plugin.name(), "alpha");
        assert!(manager.is_loaded("alpha"));
        assert_eq!(manager.metrics().reloads, 1);
    }

    #[tokio::test]
    async fn test_reload_preserves_overrides() {
        let (manager, dir) = basic_manager();
        let path = write_manifest(
            dir.path(),
            PluginMetadata::new("alpha", "1.0.0").with_tables(["users"]),
        );
        let overrides = ResourceOverrides::new().map_table("users", "accounts");
        manager
            .load_plugin(&path, Some(overrides.clone()))
            .await
            .unwrap();

        manager.reload_plugin("alpha", None).await.unwrap();
        assert_eq!(manager.get_plugin_resource_overrides("alpha"), Some(overrides));
    }

    #[tokio::test]
    async fn test_overrides_without_loaded_plugin() {
        let (manager, _dir) = basic_manager();
        let overrides = ResourceOverrides::new().tables(["users"]);
        let handle = manager
            .set_plugin_resource_overrides("idle", overrides.clone())
            .unwrap();
        assert!(handle.is_none());
        assert_eq!(manager.get_plugin_resource_overrides("idle"), Some(overrides));

        assert!(manager.clear_plugin_resource_overrides("idle").is_none());
        assert_eq!(manager.get_plugin_resource_overrides("idle"), None);

        assert!(
            manager
                .set_plugin_resource_overrides("Bad Name", ResourceOverrides::new())
                .is_err()
        );
    }

    #[test]
    fn test_override_change_outside_runtime_defers_reload() {
        let (manager, dir) = basic_manager();
        let path = write_manifest(dir.path(), PluginMetadata::new("alpha", "1.0.0"));
        tokio_test::block_on(manager.load_plugin(&path, None)).unwrap();

        let handle = manager
            .set_plugin_resource_overrides("alpha", ResourceOverrides::new().tables(["users"]))
            .unwrap();
        assert!(handle.is_none());
        assert!(manager.is_loaded("alpha"));
        assert!(manager.get_plugin_resource_overrides("alpha").is_some());
    }

    #[tokio::test]
    async fn test_unload_all_collects_failures() {
        let cleanups = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&cleanups);
        let loader = FactoryLoader::new().with_factory("flaky", move |metadata| {
            let seen = Arc::clone(&seen);
            let fails = metadata.name == "bad";
            Arc::new(
                FnPlugin::builder(metadata)
                    .on_cleanup(move || {
                        let seen = Arc::clone(&seen);
                        async move {
                            seen.fetch_add(1, Ordering::SeqCst);
                            if fails {
                                Err::<(), BoxError>("stuck".into())
                            } else {
                                Ok(())
                            }
                        }
                        .boxed()
                    })
                    .build(),
            ) as Arc<dyn Plugin>
        });
        let manager = PluginManager::new(Arc::new(loader));
        let dir = tempdir().unwrap();
        for name in ["good", "bad"] {
            let path = dir.path().join(format!("{name}.json"));
            std::fs::write(
                &path,
                format!(r#"{{"name":"{name}","version":"1.0.0","entry":"flaky"}}"#),
            )
            .unwrap();
            manager.load_plugin(&path, None).await.unwrap();
        }

        let err = manager.unload_all().await.unwrap_err();
        match err {
            PluginError::Aggregate(errors) => {
                assert_eq!(errors.len(), 1);
                assert!(matches!(
                    errors[0],
                    PluginError::UnloadFailed { ref plugin, .. } if plugin == "bad"
                ));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(cleanups.load(Ordering::SeqCst), 2);
        assert!(manager.get_plugin_names().is_empty());
    }

    #[tokio::test]
    async fn test_execute_unknown_plugin() {
        let (manager, _dir) = basic_manager();
        let err = manager.execute("nobody", Value::Null).await.unwrap_err();
        assert!(matches!(err, PluginError::PluginNotFound { .. }));
    }

    #[tokio::test]
    async fn test_execute_without_hook() {
        let (manager, dir) = basic_manager();
        let path = write_manifest(dir.path(), PluginMetadata::new("quiet", "1.0.0"));
        manager.load_plugin(&path, None).await.unwrap();

        let err = manager.execute("quiet", Value::Null).await.unwrap_err();
        assert!(matches!(err, PluginError::NotExecutable { ref plugin } if plugin == "quiet"));
    }

    #[tokio::test]
    async fn test_dependency_bookkeeping() {
        let (manager, dir) = basic_manager();
        let core = write_manifest(dir.path(), PluginMetadata::new("core", "1.0.0"));
        let ui = write_manifest(
            dir.path(),
            PluginMetadata::new("ui", "1.0.0").with_dependencies(["core"]),
        );
        manager.load_plugin(&core, None).await.unwrap();
        manager.load_plugin(&ui, None).await.unwrap();

        assert_eq!(manager.dependencies_of("ui"), vec!["core"]);
        assert_eq!(manager.dependents_of("core"), vec!["ui"]);

        manager.unload_plugin("ui").await.unwrap();
        assert!(manager.dependents_of("core").is_empty());
    }
}
