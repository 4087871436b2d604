use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PluginError, Result};
use crate::plugin::PluginMetadata;

pub const DEFAULT_MANIFEST_FILE: &str = "plugin.json";

/// On-disk plugin description: the metadata fields plus the factory entry
/// that builds the plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
    #[serde(flatten)]
    pub metadata: PluginMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,
}

impl PluginManifest {
    pub fn new(metadata: PluginMetadata) -> Self {
        Self {
            metadata,
            entry: None,
        }
    }

    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = Some(entry.into());
        self
    }

    /// Factory name, defaulting to the plugin name.
    pub fn entry_name(&self) -> &str {
        self.entry.as_deref().unwrap_or(&self.metadata.name)
    }

    /// `path` itself if it is a file, otherwise `path/manifest_file`.
    pub fn locate(path: &Path, manifest_file: &str) -> PathBuf {
        if path.is_dir() {
            path.join(manifest_file)
        } else {
            path.to_path_buf()
        }
    }

    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let manifest: Self = serde_json::from_str(content)
            .map_err(|e| PluginError::invalid_format(path, e.to_string()))?;
        manifest.metadata.check_format(path)?;
        Ok(manifest)
    }

    pub async fn load(path: &Path, manifest_file: &str) -> Result<Self> {
        let manifest_path = Self::locate(path, manifest_file);
        let content = match tokio::fs::read_to_string(&manifest_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PluginError::invalid_format(
                    path,
                    format!("manifest not found at {}", manifest_path.display()),
                ));
            }
            Err(e) => return Err(e.into()),
        };
        Self::parse(&content, path)
    }
}
