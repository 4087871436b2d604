//! # plugin-host
//!
//! Runtime plugin host: loads, unloads and reloads plugins, validates their
//! names and dependencies, gives each one an isolated view of a shared event
//! bus, and gates every database, messaging and object-store access through
//! per-plugin resource declarations.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use futures::FutureExt;
//! use plugin_host::services::MemoryBroker;
//! use plugin_host::{FactoryLoader, FnPlugin, Plugin, PluginManager};
//! use plugin_host::services::Message;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let loader = FactoryLoader::new().with_factory("notifier", |metadata| {
//!         Arc::new(
//!             FnPlugin::builder(metadata)
//!                 .on_execute(|context, input| {
//!                     async move {
//!                         context
//!                             .messaging()?
//!                             .send_message("events", vec![Message::new(input)])
//!                             .await?;
//!                         Ok(serde_json::Value::Null)
//!                     }
//!                     .boxed()
//!                 })
//!                 .build(),
//!         ) as Arc<dyn Plugin>
//!     });
//!
//!     let manager = PluginManager::builder(Arc::new(loader))
//!         .messaging(Arc::new(MemoryBroker::new()))
//!         .build()?;
//!
//!     // plugins/notifier/plugin.json:
//!     // {"name":"notifier","version":"1.0.0","allowedTopics":["events"]}
//!     manager.load_plugin("plugins/notifier", None).await?;
//!     manager.execute("notifier", serde_json::json!({"hello": "world"})).await?;
//!     manager.unload_all().await?;
//!     Ok(())
//! }
//! ```
//!
//! Resources a plugin declares are isolated by prefixing them with the
//! plugin name: `events` above lands in the broker as `notifier_events`.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod config;
pub mod context;
pub mod dependency;
pub mod error;
pub mod events;
pub mod loader;
pub mod manager;
pub mod naming;
pub mod observability;
pub mod plugin;
pub mod prelude;
pub mod proxy;
pub mod resource;
pub mod services;

pub use config::{ConfigError, HostConfig};
pub use context::PluginContext;
pub use dependency::{DependencyGraph, DependencyResolver, LoadPlan};
pub use error::{BoxError, ErrorCategory, PluginError, Result};
pub use events::{BusEvent, EventBus, ListenerId, PluginEventBus};
pub use loader::{FactoryLoader, ModuleLoader, PluginManifest};
pub use manager::{
    ManagerEvent, PluginInfo, PluginManager, PluginManagerBuilder, ReloadHandle,
};
pub use observability::{HostMetrics, MetricsSummary};
pub use plugin::{FnPlugin, Plugin, PluginMetadata};
pub use proxy::{DatabaseProxy, MessagingProxy, ObjectStoreProxy};
pub use resource::{ResourceAccess, ResourceKind, ResourceOverrides};
pub use services::Services;
