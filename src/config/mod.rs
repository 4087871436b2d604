//! Host configuration: defaults, then a JSON file, then environment
//! variables.
//!
//! ```rust,no_run
//! use plugin_host::config::HostConfig;
//!
//! # async fn example() -> Result<(), plugin_host::config::ConfigError> {
//! let config = HostConfig::from_file("plugin-host.json")
//!     .await?
//!     .apply_env()?;
//! config.validate()?;
//! # Ok(())
//! # }
//! ```

mod env;
mod host;

pub use env::{ENV_PREFIX, EnvSource};
pub use host::{DEFAULT_NOTIFICATION_CAPACITY, HostConfig};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Environment error: {0}")]
    Env(#[from] std::env::VarError),
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
