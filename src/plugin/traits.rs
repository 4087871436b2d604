//! Plugin trait and closure-based implementation.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use super::PluginMetadata;
use crate::context::PluginContext;
use crate::error::{BoxError, PluginError};

/// A unit of functionality loaded into the host at runtime.
///
/// Every hook is optional. The host never mutates a plugin after load; a
/// reload replaces the instance wholesale.
///
/// # Example
///
/// ```rust,no_run
/// use async_trait::async_trait;
/// use plugin_host::{BoxError, Plugin, PluginContext, PluginMetadata};
///
/// struct Audit {
///     metadata: PluginMetadata,
/// }
///
/// #[async_trait]
/// impl Plugin for Audit {
///     fn metadata(&self) -> &PluginMetadata {
///         &self.metadata
///     }
///
///     async fn initialize(&self, context: PluginContext) -> Result<(), BoxError> {
///         context.event_bus().on("user.created", |event| {
///             println!("audit: {}", event.payload);
///         })?;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Plugin: Send + Sync {
    fn metadata(&self) -> &PluginMetadata;

    fn name(&self) -> &str {
        &self.metadata().name
    }

    /// Called once with a fresh context before the plugin is registered.
    async fn initialize(&self, _context: PluginContext) -> Result<(), BoxError> {
        Ok(())
    }

    /// Releases resources the host does not manage. Event listeners are
    /// removed by the host regardless.
    async fn cleanup(&self) -> Result<(), BoxError> {
        Ok(())
    }

    async fn execute(&self, _input: Value) -> Result<Value, BoxError> {
        Err(Box::new(PluginError::NotExecutable {
            plugin: self.name().to_string(),
        }))
    }
}

impl std::fmt::Debug for dyn Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let metadata = self.metadata();
        f.debug_struct("Plugin")
            .field("name", &metadata.name)
            .field("version", &metadata.version)
            .finish_non_exhaustive()
    }
}

type InitFn = Arc<dyn Fn(PluginContext) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;
type CleanupFn = Arc<dyn Fn() -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;
type ExecuteFn =
    Arc<dyn Fn(PluginContext, Value) -> BoxFuture<'static, Result<Value, BoxError>> + Send + Sync>;

/// Plugin assembled from closures.
///
/// The context handed to `initialize` is retained and passed to the execute
/// closure, so `execute` only works on an initialized instance.
pub struct FnPlugin {
    metadata: PluginMetadata,
    on_initialize: Option<InitFn>,
    on_cleanup: Option<CleanupFn>,
    on_execute: Option<ExecuteFn>,
    context: Mutex<Option<PluginContext>>,
}

impl FnPlugin {
    pub fn builder(metadata: PluginMetadata) -> FnPluginBuilder {
        FnPluginBuilder {
            metadata,
            on_initialize: None,
            on_cleanup: None,
            on_execute: None,
        }
    }

    pub fn new(metadata: PluginMetadata) -> Self {
        Self::builder(metadata).build()
    }

    /// Context received at initialization, if any.
    pub fn context(&self) -> Option<PluginContext> {
        self.context
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

pub struct FnPluginBuilder {
    metadata: PluginMetadata,
    on_initialize: Option<InitFn>,
    on_cleanup: Option<CleanupFn>,
    on_execute: Option<ExecuteFn>,
}

impl FnPluginBuilder {
    pub fn on_initialize<F>(mut self, f: F) -> Self
    where
        F: Fn(PluginContext) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync + 'static,
    {
        self.on_initialize = Some(Arc::new(f));
        self
    }

    pub fn on_cleanup<F>(mut self, f: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync + 'static,
    {
        self.on_cleanup = Some(Arc::new(f));
        self
    }

    pub fn on_execute<F>(mut self, f: F) -> Self
    where
        F: Fn(PluginContext, Value) -> BoxFuture<'static, Result<Value, BoxError>>
            + Send
            + Sync
            + 'static,
    {
        self.on_execute = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> FnPlugin {
        FnPlugin {
            metadata: self.metadata,
            on_initialize: self.on_initialize,
            on_cleanup: self.on_cleanup,
            on_execute: self.on_execute,
            context: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Plugin for FnPlugin {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn initialize(&self, context: PluginContext) -> Result<(), BoxError> {
        *self.context.lock().unwrap_or_else(|e| e.into_inner()) = Some(context.clone());
        match &self.on_initialize {
            Some(f) => f(context).await,
            None => Ok(()),
        }
    }

    async fn cleanup(&self) -> Result<(), BoxError> {
        self.context.lock().unwrap_or_else(|e| e.into_inner()).take();
        match &self.on_cleanup {
            Some(f) => f().await,
            None => Ok(()),
        }
    }

    async fn execute(&self, input: Value) -> Result<Value, BoxError> {
        let not_executable = || -> BoxError {
            Box::new(PluginError::NotExecutable {
                plugin: self.metadata.name.clone(),
            })
        };
        let f = self.on_execute.as_ref().ok_or_else(not_executable)?;
        let context = self.context().ok_or_else(not_executable)?;
        f(context, input).await
    }
}

impl std::fmt::Debug for FnPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnPlugin")
            .field("name", &self.metadata.name)
            .field("version", &self.metadata.version)
            .field("has_initialize", &self.on_initialize.is_some())
            .field("has_cleanup", &self.on_cleanup.is_some())
            .field("has_execute", &self.on_execute.is_some())
            .finish()
    }
}
