use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{ConfigError, ConfigResult, EnvSource};
use crate::loader::DEFAULT_MANIFEST_FILE;
use crate::naming;
use crate::resource::ResourceOverrides;

pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 256;

fn default_capacity() -> usize {
    DEFAULT_NOTIFICATION_CAPACITY
}

fn default_manifest_file() -> String {
    DEFAULT_MANIFEST_FILE.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostConfig {
    /// Directory scanned by `load_plugins_from_directory` when none is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugins_dir: Option<PathBuf>,
    /// Buffer size of the lifecycle notification channel.
    #[serde(default = "default_capacity")]
    pub notification_capacity: usize,
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,
    /// Operator overrides in place before any plugin loads.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub overrides: HashMap<String, ResourceOverrides>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            plugins_dir: None,
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
            manifest_file: default_manifest_file(),
            overrides: HashMap::new(),
        }
    }
}

impl HostConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plugins_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plugins_dir = Some(dir.into());
        self
    }

    pub fn with_notification_capacity(mut self, capacity: usize) -> Self {
        self.notification_capacity = capacity;
        self
    }

    pub fn with_manifest_file(mut self, file: impl Into<String>) -> Self {
        self.manifest_file = file.into();
        self
    }

    pub fn with_overrides(mut self, plugin: impl Into<String>, overrides: ResourceOverrides) -> Self {
        self.overrides.insert(plugin.into(), overrides);
        self
    }

    /// Reads a JSON config file. A missing file yields the defaults.
    pub async fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Applies `PLUGIN_HOST_*` environment variables over this config.
    pub fn apply_env(self) -> ConfigResult<Self> {
        self.apply_env_from(&EnvSource::default())
    }

    pub fn apply_env_from(mut self, env: &EnvSource) -> ConfigResult<Self> {
        if let Some(dir) = env.get("plugins_dir")? {
            self.plugins_dir = Some(PathBuf::from(dir));
        }
        if let Some(capacity) = env.get_parsed::<usize>("notification_capacity")? {
            self.notification_capacity = capacity;
        }
        if let Some(file) = env.get("manifest_file")? {
            self.manifest_file = file;
        }
        Ok(self)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.notification_capacity == 0 {
            return Err(ConfigError::invalid(
                "notificationCapacity",
                "must be greater than zero",
            ));
        }
        if self.manifest_file.trim().is_empty()
            || self.manifest_file.contains(['/', '\\'])
        {
            return Err(ConfigError::invalid(
                "manifestFile",
                format!("'{}' must be a plain file name", self.manifest_file),
            ));
        }
        for (plugin, overrides) in &self.overrides {
            let key = format!("overrides.{}", plugin);
            naming::validate_plugin_name(plugin)
                .and_then(|_| overrides.validate())
                .map_err(|e| ConfigError::invalid(key, e.to_string()))?;
        }
        Ok(())
    }
}
