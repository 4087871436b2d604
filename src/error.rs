use std::path::PathBuf;

use crate::resource::ResourceKind;

/// Error raised by plugin code from its lifecycle hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error type for every host operation.
///
/// Variants are grouped by when they occur: validation-time errors reject a
/// plugin before any state changes, access-time errors reject a single
/// resource operation, lifecycle-time errors affect host-visible state.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PluginError {
    #[error("Invalid {kind} name '{name}': {reason}")]
    InvalidNamingConvention {
        kind: &'static str,
        name: String,
        reason: String,
        plugin: Option<String>,
    },

    #[error("Plugin '{plugin}' depends on '{dependency}', which is not loaded")]
    DependencyNotFound { plugin: String, dependency: String },

    #[error("Plugin '{plugin}' cannot depend on itself")]
    SelfDependency { plugin: String },

    #[error("Circular dependency detected: {}", chain.join(" -> "))]
    CircularDependency { plugin: String, chain: Vec<String> },

    #[error("Invalid plugin format at {path}: {reason}")]
    InvalidPluginFormat { path: PathBuf, reason: String },

    #[error("Unable to resolve dependencies for plugins: {}", unresolved.join(", "))]
    DependencyResolution { unresolved: Vec<String> },

    #[error("Plugin '{plugin}' may not access table '{table}'; allowed tables: [{}]", allowed.join(", "))]
    TableAccessDenied {
        plugin: String,
        table: String,
        allowed: Vec<String>,
    },

    #[error("Plugin '{plugin}' may not access topic '{topic}'; allowed topics: [{}]", allowed.join(", "))]
    TopicAccessDenied {
        plugin: String,
        topic: String,
        allowed: Vec<String>,
    },

    #[error("Plugin '{plugin}' may not access bucket '{bucket}'; allowed buckets: [{}]", allowed.join(", "))]
    BucketAccessDenied {
        plugin: String,
        bucket: String,
        allowed: Vec<String>,
    },

    #[error("Plugin not found: {name}")]
    PluginNotFound { name: String },

    #[error("Failed to load plugin from {path}: {source}")]
    LoadFailed {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("Failed to unload plugin '{plugin}': {source}")]
    UnloadFailed {
        plugin: String,
        #[source]
        source: BoxError,
    },

    #[error("Plugin '{plugin}' requested undeclared dependency '{dependency}'")]
    UndeclaredDependency { plugin: String, dependency: String },

    #[error("Context of plugin '{plugin}' is no longer valid")]
    ContextInvalidated { plugin: String },

    #[error("Plugin '{plugin}' has no {service} service available")]
    ServiceUnavailable {
        plugin: String,
        service: &'static str,
    },

    #[error("Plugin '{plugin}' does not implement execute")]
    NotExecutable { plugin: String },

    #[error("Plugin '{plugin}' failed to execute: {source}")]
    ExecuteFailed {
        plugin: String,
        #[source]
        source: BoxError,
    },

    #[error("{service} service error: {message}")]
    Service {
        service: &'static str,
        message: String,
    },

    #[error("{} plugin operations failed: {}", .0.len(), join_errors(.0))]
    Aggregate(Vec<PluginError>),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn join_errors(errors: &[PluginError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Coarse classification of [`PluginError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rejected before any state mutation.
    Validation,
    /// A single resource operation was refused; the plugin stays loaded.
    Access,
    /// Affects the registry or a plugin's lifecycle state.
    Lifecycle,
    /// Reported by an external backing service.
    Service,
    /// IO, serialization, or aggregated failures.
    Internal,
}

impl PluginError {
    pub fn naming(kind: &'static str, name: impl Into<String>, reason: impl Into<String>) -> Self {
        PluginError::InvalidNamingConvention {
            kind,
            name: name.into(),
            reason: reason.into(),
            plugin: None,
        }
    }

    /// Attributes a naming error to `plugin` if it is not attributed yet.
    pub fn for_plugin(self, plugin: &str) -> Self {
        match self {
            PluginError::InvalidNamingConvention {
                kind,
                name,
                reason,
                plugin: None,
            } => PluginError::InvalidNamingConvention {
                kind,
                name,
                reason,
                plugin: Some(plugin.to_string()),
            },
            other => other,
        }
    }

    pub fn invalid_format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        PluginError::InvalidPluginFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn service(service: &'static str, message: impl Into<String>) -> Self {
        PluginError::Service {
            service,
            message: message.into(),
        }
    }

    pub(crate) fn access_denied(
        kind: ResourceKind,
        plugin: &str,
        resource: &str,
        allowed: Vec<String>,
    ) -> Self {
        let plugin = plugin.to_string();
        let resource = resource.to_string();
        match kind {
            ResourceKind::Table => PluginError::TableAccessDenied {
                plugin,
                table: resource,
                allowed,
            },
            ResourceKind::Topic => PluginError::TopicAccessDenied {
                plugin,
                topic: resource,
                allowed,
            },
            ResourceKind::Bucket => PluginError::BucketAccessDenied {
                plugin,
                bucket: resource,
                allowed,
            },
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            PluginError::InvalidNamingConvention { .. }
            | PluginError::DependencyNotFound { .. }
            | PluginError::SelfDependency { .. }
            | PluginError::CircularDependency { .. }
            | PluginError::InvalidPluginFormat { .. }
            | PluginError::DependencyResolution { .. } => ErrorCategory::Validation,

            PluginError::TableAccessDenied { .. }
            | PluginError::TopicAccessDenied { .. }
            | PluginError::BucketAccessDenied { .. } => ErrorCategory::Access,

            PluginError::PluginNotFound { .. }
            | PluginError::LoadFailed { .. }
            | PluginError::UnloadFailed { .. }
            | PluginError::UndeclaredDependency { .. }
            | PluginError::ContextInvalidated { .. }
            | PluginError::ServiceUnavailable { .. }
            | PluginError::NotExecutable { .. }
            | PluginError::ExecuteFailed { .. } => ErrorCategory::Lifecycle,

            PluginError::Service { .. } => ErrorCategory::Service,

            PluginError::Aggregate(_) | PluginError::Io(_) | PluginError::Json(_) => {
                ErrorCategory::Internal
            }
        }
    }

    pub fn is_validation(&self) -> bool {
        self.category() == ErrorCategory::Validation
    }

    pub fn is_access_denied(&self) -> bool {
        self.category() == ErrorCategory::Access
    }

    /// Name of the plugin the error is about, when it carries one.
    pub fn plugin_name(&self) -> Option<&str> {
        match self {
            PluginError::DependencyNotFound { plugin, .. }
            | PluginError::SelfDependency { plugin }
            | PluginError::CircularDependency { plugin, .. }
            | PluginError::TableAccessDenied { plugin, .. }
            | PluginError::TopicAccessDenied { plugin, .. }
            | PluginError::BucketAccessDenied { plugin, .. }
            | PluginError::UnloadFailed { plugin, .. }
            | PluginError::UndeclaredDependency { plugin, .. }
            | PluginError::ContextInvalidated { plugin }
            | PluginError::ServiceUnavailable { plugin, .. }
            | PluginError::NotExecutable { plugin }
            | PluginError::ExecuteFailed { plugin, .. } => Some(plugin),
            PluginError::PluginNotFound { name } => Some(name),
            PluginError::InvalidNamingConvention { plugin, .. } => plugin.as_deref(),
            _ => None,
        }
    }

    /// Allowed (unprefixed) resources listed by an access-denied error.
    pub fn allowed_resources(&self) -> Option<&[String]> {
        match self {
            PluginError::TableAccessDenied { allowed, .. }
            | PluginError::TopicAccessDenied { allowed, .. }
            | PluginError::BucketAccessDenied { allowed, .. } => Some(allowed),
            _ => None,
        }
    }

    /// Copy of this error for broadcasting. Boxed sources are carried over
    /// as their messages; IO and JSON errors keep their kind and message.
    pub fn duplicate(&self) -> PluginError {
        fn message(source: &BoxError) -> BoxError {
            source.to_string().into()
        }

        match self {
            PluginError::InvalidNamingConvention {
                kind,
                name,
                reason,
                plugin,
            } => PluginError::InvalidNamingConvention {
                kind: *kind,
                name: name.clone(),
                reason: reason.clone(),
                plugin: plugin.clone(),
            },
            PluginError::DependencyNotFound { plugin, dependency } => {
                PluginError::DependencyNotFound {
                    plugin: plugin.clone(),
                    dependency: dependency.clone(),
                }
            }
            PluginError::SelfDependency { plugin } => PluginError::SelfDependency {
                plugin: plugin.clone(),
            },
            PluginError::CircularDependency { plugin, chain } => PluginError::CircularDependency {
                plugin: plugin.clone(),
                chain: chain.clone(),
            },
            PluginError::InvalidPluginFormat { path, reason } => PluginError::InvalidPluginFormat {
                path: path.clone(),
                reason: reason.clone(),
            },
            PluginError::DependencyResolution { unresolved } => PluginError::DependencyResolution {
                unresolved: unresolved.clone(),
            },
            PluginError::TableAccessDenied {
                plugin,
                table,
                allowed,
            } => PluginError::TableAccessDenied {
                plugin: plugin.clone(),
                table: table.clone(),
                allowed: allowed.clone(),
            },
            PluginError::TopicAccessDenied {
                plugin,
                topic,
                allowed,
            } => PluginError::TopicAccessDenied {
                plugin: plugin.clone(),
                topic: topic.clone(),
                allowed: allowed.clone(),
            },
            PluginError::BucketAccessDenied {
                plugin,
                bucket,
                allowed,
            } => PluginError::BucketAccessDenied {
                plugin: plugin.clone(),
                bucket: bucket.clone(),
                allowed: allowed.clone(),
            },
            PluginError::PluginNotFound { name } => PluginError::PluginNotFound { name: name.clone() },
            PluginError::LoadFailed { path, source } => PluginError::LoadFailed {
                path: path.clone(),
                source: message(source),
            },
            PluginError::UnloadFailed { plugin, source } => PluginError::UnloadFailed {
                plugin: plugin.clone(),
                source: message(source),
            },
            PluginError::UndeclaredDependency { plugin, dependency } => {
                PluginError::UndeclaredDependency {
                    plugin: plugin.clone(),
                    dependency: dependency.clone(),
                }
            }
            PluginError::ContextInvalidated { plugin } => PluginError::ContextInvalidated {
                plugin: plugin.clone(),
            },
            PluginError::ServiceUnavailable { plugin, service } => PluginError::ServiceUnavailable {
                plugin: plugin.clone(),
                service: *service,
            },
            PluginError::NotExecutable { plugin } => PluginError::NotExecutable {
                plugin: plugin.clone(),
            },
            PluginError::ExecuteFailed { plugin, source } => PluginError::ExecuteFailed {
                plugin: plugin.clone(),
                source: message(source),
            },
            PluginError::Service { service, message } => PluginError::Service {
                service: *service,
                message: message.clone(),
            },
            PluginError::Aggregate(errors) => {
                PluginError::Aggregate(errors.iter().map(PluginError::duplicate).collect())
            }
            PluginError::Io(e) => PluginError::Io(std::io::Error::new(e.kind(), e.to_string())),
            PluginError::Json(e) => {
                PluginError::Json(<serde_json::Error as serde::de::Error>::custom(e.to_string()))
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, PluginError>;
