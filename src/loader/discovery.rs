use std::path::{Path, PathBuf};

use crate::error::Result;

/// Finds plugin candidates among the immediate children of a directory:
/// subdirectories holding a manifest file, and loose `*.json` manifests.
pub struct ManifestDiscovery;

impl ManifestDiscovery {
    pub async fn discover(dir: &Path, manifest_file: &str) -> Result<Vec<PathBuf>> {
        if !tokio::fs::try_exists(dir).await? {
            tracing::debug!(dir = %dir.display(), "Plugin directory does not exist");
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                if tokio::fs::try_exists(path.join(manifest_file)).await? {
                    found.push(path);
                }
            } else if path.extension().is_some_and(|ext| ext == "json") {
                found.push(path);
            }
        }

        found.sort();
        Ok(found)
    }
}
