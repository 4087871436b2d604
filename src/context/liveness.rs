use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{PluginError, Result};

/// Validity flag shared by a context and every handle derived from it.
///
/// Each load creates a fresh flag, so a handle captured from an earlier
/// instance stays invalid after the plugin is loaded again.
#[derive(Debug, Clone)]
pub struct Liveness {
    plugin: Arc<str>,
    valid: Arc<AtomicBool>,
}

impl Liveness {
    pub fn new(plugin: &str) -> Self {
        Self {
            plugin: Arc::from(plugin),
            valid: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Permanently invalidates the flag. Returns `false` if it was already
    /// invalid.
    pub fn invalidate(&self) -> bool {
        self.valid.swap(false, Ordering::AcqRel)
    }

    pub fn ensure(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(PluginError::ContextInvalidated {
                plugin: self.plugin.to_string(),
            })
        }
    }
}
