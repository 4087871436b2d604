//! Prelude module for convenient imports.
//!
//! ```rust
//! use plugin_host::prelude::*;
//! ```

// Operator surface
pub use crate::HostConfig;
pub use crate::ManagerEvent;
pub use crate::PluginManager;
pub use crate::PluginManagerBuilder;
pub use crate::ReloadHandle;
pub use crate::loader::{FactoryLoader, ModuleLoader};

// Plugin surface
pub use crate::FnPlugin;
pub use crate::Plugin;
pub use crate::PluginContext;
pub use crate::PluginMetadata;
pub use crate::events::{BusEvent, PluginEventBus};

// Resources
pub use crate::resource::{ResourceKind, ResourceOverrides};
pub use crate::services::{Message, QueryResult, Services};

// Errors
pub use crate::{BoxError, ErrorCategory, PluginError, Result};
