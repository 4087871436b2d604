//! The per-plugin context handed to [`Plugin::initialize`].
//!
//! A context is created fresh for every load and becomes permanently invalid
//! as soon as that instance's unload begins. Every handle derived from it
//! (event bus, proxies) shares the same validity flag.
//!
//! [`Plugin::initialize`]: crate::plugin::Plugin::initialize

mod liveness;

pub use liveness::Liveness;

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crate::error::{PluginError, Result};
use crate::events::{EventBus, ListenerRegistry, PluginEventBus};
use crate::manager::PluginRegistry;
use crate::observability::HostMetrics;
use crate::plugin::{Plugin, PluginMetadata};
use crate::proxy::{
    AccessGate, DatabaseProxy, MessagingProxy, ObjectStoreProxy, StatementRewriter,
};
use crate::resource::{ResourceAccess, ResourceOverrides};
use crate::services::Services;

#[derive(Clone)]
pub struct PluginContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    plugin: String,
    dependencies: Vec<String>,
    liveness: Liveness,
    events: PluginEventBus,
    plugins: Weak<PluginRegistry>,
    access: Arc<ResourceAccess>,
    database: Option<DatabaseProxy>,
    messaging: Option<MessagingProxy>,
    object_store: Option<ObjectStoreProxy>,
}

/// Host-side collaborators a context is assembled from.
#[derive(Clone)]
pub(crate) struct ContextFactory {
    pub(crate) bus: EventBus,
    pub(crate) listeners: Arc<ListenerRegistry>,
    pub(crate) plugins: Arc<PluginRegistry>,
    pub(crate) services: Services,
    pub(crate) rewriter: Arc<dyn StatementRewriter>,
    pub(crate) metrics: Arc<HostMetrics>,
}

impl ContextFactory {
    /// Builds a context whose resource set is fixed from `metadata` and
    /// `overrides` at this moment.
    pub(crate) fn create(
        &self,
        metadata: &PluginMetadata,
        overrides: Option<&ResourceOverrides>,
    ) -> PluginContext {
        let name = metadata.name.as_str();
        let liveness = Liveness::new(name);
        let access = Arc::new(ResourceAccess::new(metadata, overrides));
        let gate = AccessGate::new(
            Arc::clone(&access),
            liveness.clone(),
            Arc::clone(&self.metrics),
        );

        let database = self.services.database.as_ref().map(|service| {
            DatabaseProxy::new(gate.clone(), Arc::clone(service), Arc::clone(&self.rewriter))
        });
        let messaging = self.services.messaging.as_ref().map(|service| {
            MessagingProxy::new(gate.clone(), Arc::clone(service), Arc::clone(&self.rewriter))
        });
        let object_store = self
            .services
            .object_store
            .as_ref()
            .map(|service| ObjectStoreProxy::new(gate.clone(), Arc::clone(service)));

        let events = PluginEventBus::new(
            name,
            self.bus.clone(),
            Arc::clone(&self.listeners),
            liveness.clone(),
            Arc::clone(&self.metrics),
        );

        PluginContext {
            inner: Arc::new(ContextInner {
                plugin: name.to_string(),
                dependencies: metadata.dependencies.clone(),
                liveness,
                events,
                plugins: Arc::downgrade(&self.plugins),
                access,
                database,
                messaging,
                object_store,
            }),
        }
    }
}

impl PluginContext {
    pub fn plugin_name(&self) -> &str {
        &self.inner.plugin
    }

    pub fn is_valid(&self) -> bool {
        self.inner.liveness.is_valid()
    }

    pub(crate) fn liveness(&self) -> &Liveness {
        &self.inner.liveness
    }

    fn ensure(&self) -> Result<()> {
        self.inner.liveness.ensure()
    }

    /// Event bus scoped to this plugin. Its methods fail once the context
    /// is invalid.
    pub fn event_bus(&self) -> &PluginEventBus {
        &self.inner.events
    }

    /// The effective resource set this context was created with.
    pub fn resources(&self) -> Result<&ResourceAccess> {
        self.ensure()?;
        Ok(&self.inner.access)
    }

    /// Returns a declared dependency if it is currently loaded.
    pub fn get_dependency(&self, name: &str) -> Result<Option<Arc<dyn Plugin>>> {
        self.ensure()?;
        if !self.inner.dependencies.iter().any(|d| d == name) {
            tracing::warn!(
                plugin = %self.inner.plugin,
                dependency = name,
                "Undeclared dependency requested"
            );
            return Err(PluginError::UndeclaredDependency {
                plugin: self.inner.plugin.clone(),
                dependency: name.to_string(),
            });
        }
        Ok(self
            .inner
            .plugins
            .upgrade()
            .and_then(|plugins| plugins.get_plugin(name)))
    }

    /// All currently loaded declared dependencies, by name.
    pub fn get_dependencies(&self) -> Result<HashMap<String, Arc<dyn Plugin>>> {
        self.ensure()?;
        let Some(plugins) = self.inner.plugins.upgrade() else {
            return Ok(HashMap::new());
        };
        Ok(self
            .inner
            .dependencies
            .iter()
            .filter_map(|name| {
                plugins
                    .get_plugin(name)
                    .map(|plugin| (name.clone(), plugin))
            })
            .collect())
    }

    pub fn has_database(&self) -> bool {
        self.inner.database.is_some()
    }

    pub fn has_messaging(&self) -> bool {
        self.inner.messaging.is_some()
    }

    pub fn has_object_store(&self) -> bool {
        self.inner.object_store.is_some()
    }

    pub fn database(&self) -> Result<&DatabaseProxy> {
        self.ensure()?;
        self.inner
            .database
            .as_ref()
            .ok_or_else(|| self.unavailable("database"))
    }

    pub fn messaging(&self) -> Result<&MessagingProxy> {
        self.ensure()?;
        self.inner
            .messaging
            .as_ref()
            .ok_or_else(|| self.unavailable("messaging"))
    }

    pub fn object_store(&self) -> Result<&ObjectStoreProxy> {
        self.ensure()?;
        self.inner
            .object_store
            .as_ref()
            .ok_or_else(|| self.unavailable("object store"))
    }

    fn unavailable(&self, service: &'static str) -> PluginError {
        PluginError::ServiceUnavailable {
            plugin: self.inner.plugin.clone(),
            service,
        }
    }
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("plugin", &self.inner.plugin)
            .field("dependencies", &self.inner.dependencies)
            .field("valid", &self.is_valid())
            .field("database", &self.has_database())
            .field("messaging", &self.has_messaging())
            .field("object_store", &self.has_object_store())
            .finish()
    }
}
