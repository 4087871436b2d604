//! Plugin metadata and the plugin trait.

mod metadata;
mod traits;

pub use metadata::PluginMetadata;
pub use traits::{FnPlugin, FnPluginBuilder, Plugin};
