use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PluginError, Result};
use crate::resource::ResourceKind;

/// Static description of a plugin: identity, dependencies, and the resources
/// it declares access to.
///
/// An absent resource list means zero access to that kind of resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginMetadata {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_tables: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_topics: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_buckets: Option<Vec<String>>,
}

impl PluginMetadata {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tables(mut self, tables: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.allowed_tables = Some(tables.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_topics(mut self, topics: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.allowed_topics = Some(topics.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_buckets(mut self, buckets: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.allowed_buckets = Some(buckets.into_iter().map(Into::into).collect());
        self
    }

    pub fn declared(&self, kind: ResourceKind) -> Option<&[String]> {
        match kind {
            ResourceKind::Table => self.allowed_tables.as_deref(),
            ResourceKind::Topic => self.allowed_topics.as_deref(),
            ResourceKind::Bucket => self.allowed_buckets.as_deref(),
        }
    }

    pub fn depends_on(&self, name: &str) -> bool {
        self.dependencies.iter().any(|d| d == name)
    }

    /// Structural checks made before naming rules: required fields present
    /// and dependency entries non-empty.
    pub fn check_format(&self, path: &Path) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(PluginError::invalid_format(path, "metadata.name is required"));
        }
        if self.version.trim().is_empty() {
            return Err(PluginError::invalid_format(
                path,
                format!("metadata.version is required for plugin '{}'", self.name),
            ));
        }
        if self.dependencies.iter().any(|d| d.trim().is_empty()) {
            return Err(PluginError::invalid_format(
                path,
                format!("plugin '{}' declares an empty dependency name", self.name),
            ));
        }
        Ok(())
    }
}
