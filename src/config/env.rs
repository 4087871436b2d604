use std::collections::HashMap;

use super::{ConfigError, ConfigResult};

pub const ENV_PREFIX: &str = "PLUGIN_HOST_";

/// Read-only view of environment variables under a prefix.
///
/// Keys are upper-cased and `.` becomes `_`, so `plugins_dir` reads
/// `PLUGIN_HOST_PLUGINS_DIR`.
#[derive(Debug, Clone)]
pub struct EnvSource {
    prefix: String,
    fixed: Option<HashMap<String, String>>,
}

impl EnvSource {
    pub fn prefixed(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            fixed: None,
        }
    }

    /// A source that reads from `vars` instead of the process environment.
    pub fn from_vars<K, V>(prefix: impl Into<String>, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            prefix: prefix.into(),
            fixed: Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect()),
        }
    }

    pub fn env_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key.to_uppercase().replace('.', "_"))
    }

    pub fn get(&self, key: &str) -> ConfigResult<Option<String>> {
        let env_key = self.env_key(key);
        if let Some(vars) = &self.fixed {
            return Ok(vars.get(&env_key).cloned());
        }
        match std::env::var(&env_key) {
            Ok(value) => Ok(Some(value)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(ConfigError::Env(e)),
        }
    }

    pub fn get_parsed<T>(&self, key: &str) -> ConfigResult<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key)? {
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|e| ConfigError::invalid(self.env_key(key), format!("{}", e))),
            None => Ok(None),
        }
    }
}

impl Default for EnvSource {
    fn default() -> Self {
        Self::prefixed(ENV_PREFIX)
    }
}
