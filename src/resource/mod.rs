//! Declared resources, operator overrides, and the access controller that
//! turns them into isolated actual names.

mod access;
mod kind;
pub mod namespace;
mod overrides;

pub use access::ResourceAccess;
pub use kind::ResourceKind;
pub use overrides::ResourceOverrides;

use crate::error::{PluginError, Result};
use crate::naming;
use crate::plugin::PluginMetadata;

/// Validates every declared and overridden resource name of a plugin.
pub fn validate_declarations(
    metadata: &PluginMetadata,
    overrides: Option<&ResourceOverrides>,
) -> Result<()> {
    let attribute = |e: PluginError| e.for_plugin(&metadata.name);
    for kind in ResourceKind::ALL {
        if let Some(list) = metadata.declared(kind) {
            naming::validate_resource_names(kind, list).map_err(attribute)?;
        }
    }
    if let Some(overrides) = overrides {
        overrides.validate().map_err(attribute)?;
    }
    Ok(())
}
