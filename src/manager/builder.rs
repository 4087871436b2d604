use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tokio::sync::broadcast;

use super::{ManagerInner, PluginManager, PluginRegistry};
use crate::config::{ConfigResult, HostConfig};
use crate::context::ContextFactory;
use crate::dependency::DependencyGraph;
use crate::events::{EventBus, ListenerRegistry};
use crate::loader::ModuleLoader;
use crate::observability::HostMetrics;
use crate::proxy::{RegexRewriter, StatementRewriter};
use crate::services::{DatabaseService, MessagingService, ObjectStoreService, Services};

/// Assembles a [`PluginManager`] from a loader, configuration and the
/// optional backing services.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use plugin_host::config::HostConfig;
/// use plugin_host::services::MemoryDatabase;
/// use plugin_host::{FactoryLoader, PluginManager};
///
/// # fn example() -> Result<(), plugin_host::config::ConfigError> {
/// let manager = PluginManager::builder(Arc::new(FactoryLoader::new()))
///     .config(HostConfig::new().with_plugins_dir("plugins"))
///     .database(Arc::new(MemoryDatabase::new()))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct PluginManagerBuilder {
    loader: Arc<dyn ModuleLoader>,
    config: HostConfig,
    services: Services,
    rewriter: Arc<dyn StatementRewriter>,
    bus: Option<EventBus>,
}

impl PluginManagerBuilder {
    pub fn new(loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            loader,
            config: HostConfig::default(),
            services: Services::default(),
            rewriter: Arc::new(RegexRewriter::new()),
            bus: None,
        }
    }

    pub fn config(mut self, config: HostConfig) -> Self {
        self.config = config;
        self
    }

    pub fn database(mut self, database: Arc<dyn DatabaseService>) -> Self {
        self.services.database = Some(database);
        self
    }

    pub fn messaging(mut self, messaging: Arc<dyn MessagingService>) -> Self {
        self.services.messaging = Some(messaging);
        self
    }

    pub fn object_store(mut self, object_store: Arc<dyn ObjectStoreService>) -> Self {
        self.services.object_store = Some(object_store);
        self
    }

    pub fn services(mut self, services: Services) -> Self {
        self.services = services;
        self
    }

    /// Replaces the default regex-based statement rewriter.
    pub fn rewriter(mut self, rewriter: Arc<dyn StatementRewriter>) -> Self {
        self.rewriter = rewriter;
        self
    }

    /// Shares an existing bus instead of creating one.
    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Validates the configuration and builds the manager.
    pub fn build(self) -> ConfigResult<PluginManager> {
        self.config.validate()?;
        Ok(self.assemble())
    }

    pub(super) fn assemble(self) -> PluginManager {
        let registry = Arc::new(PluginRegistry::new());
        let metrics = Arc::new(HostMetrics::new());
        let overrides: DashMap<_, _> = self
            .config
            .overrides
            .iter()
            .map(|(name, o)| (name.clone(), o.clone()))
            .collect();
        let (notifications, _) = broadcast::channel(self.config.notification_capacity.max(1));

        tracing::debug!(
            services = ?self.services,
            overrides = overrides.len(),
            "Plugin manager assembled"
        );

        PluginManager {
            inner: Arc::new(ManagerInner {
                contexts: ContextFactory {
                    bus: self.bus.unwrap_or_default(),
                    listeners: Arc::new(ListenerRegistry::new()),
                    plugins: Arc::clone(&registry),
                    services: self.services,
                    rewriter: self.rewriter,
                    metrics: Arc::clone(&metrics),
                },
                config: self.config,
                loader: self.loader,
                registry,
                graph: Mutex::new(DependencyGraph::new()),
                overrides,
                paths: DashMap::new(),
                notifications,
                transition: tokio::sync::Mutex::new(()),
                metrics,
            }),
        }
    }
}

impl std::fmt::Debug for PluginManagerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManagerBuilder")
            .field("config", &self.config)
            .field("services", &self.services)
            .finish()
    }
}
