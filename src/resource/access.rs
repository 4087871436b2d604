//! Per-plugin resource access controller.

use std::collections::{HashMap, HashSet};

use super::{ResourceKind, ResourceOverrides, namespace};
use crate::error::{PluginError, Result};
use crate::plugin::PluginMetadata;

#[derive(Debug, Clone, Default)]
struct ResourceSet {
    declared: Vec<String>,
    name_map: HashMap<String, String>,
    actual: HashSet<String>,
}

/// The resources one plugin may reach, fixed when its context is built.
///
/// Declared names stay unprefixed for introspection; access checks are made
/// against `{plugin}_{mapped-or-declared}` actual names.
#[derive(Debug, Clone)]
pub struct ResourceAccess {
    plugin: String,
    tables: ResourceSet,
    topics: ResourceSet,
    buckets: ResourceSet,
}

impl ResourceAccess {
    pub fn new(metadata: &PluginMetadata, overrides: Option<&ResourceOverrides>) -> Self {
        let plugin = metadata.name.clone();
        let build = |kind: ResourceKind| {
            let declared: Vec<String> = overrides
                .and_then(|o| o.list(kind))
                .or_else(|| metadata.declared(kind))
                .map(<[String]>::to_vec)
                .unwrap_or_default();

            let name_map: HashMap<String, String> = overrides
                .and_then(|o| o.name_map(kind))
                .map(|m| {
                    m.iter()
                        .map(|(k, v)| (kind.normalize(k), kind.normalize(v)))
                        .collect()
                })
                .unwrap_or_default();

            let actual = declared
                .iter()
                .map(|name| {
                    let name = kind.normalize(name);
                    let mapped = name_map.get(&name).cloned().unwrap_or(name);
                    namespace::isolated(&plugin, &mapped)
                })
                .collect();

            ResourceSet {
                declared,
                name_map,
                actual,
            }
        };

        Self {
            tables: build(ResourceKind::Table),
            topics: build(ResourceKind::Topic),
            buckets: build(ResourceKind::Bucket),
            plugin,
        }
    }

    fn set(&self, kind: ResourceKind) -> &ResourceSet {
        match kind {
            ResourceKind::Table => &self.tables,
            ResourceKind::Topic => &self.topics,
            ResourceKind::Bucket => &self.buckets,
        }
    }

    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// Declared (unprefixed, pre-mapping) names of `kind`.
    pub fn allowed(&self, kind: ResourceKind) -> &[String] {
        &self.set(kind).declared
    }

    pub fn allowed_tables(&self) -> &[String] {
        self.allowed(ResourceKind::Table)
    }

    pub fn allowed_topics(&self) -> &[String] {
        self.allowed(ResourceKind::Topic)
    }

    pub fn allowed_buckets(&self) -> &[String] {
        self.allowed(ResourceKind::Bucket)
    }

    pub fn name_map(&self, kind: ResourceKind) -> &HashMap<String, String> {
        &self.set(kind).name_map
    }

    /// Maps `name` through the name map and applies the isolation prefix.
    pub fn resolve(&self, kind: ResourceKind, name: &str) -> String {
        let name = kind.normalize(name);
        let mapped = self.set(kind).name_map.get(&name).cloned().unwrap_or(name);
        namespace::isolated(&self.plugin, &mapped)
    }

    pub fn is_allowed(&self, kind: ResourceKind, actual_name: &str) -> bool {
        self.set(kind).actual.contains(&kind.normalize(actual_name))
    }

    /// Resolves `name` and returns the actual name, or the matching
    /// access-denied error listing the declared names.
    pub fn check(&self, kind: ResourceKind, name: &str) -> Result<String> {
        let actual = self.resolve(kind, name);
        if self.is_allowed(kind, &actual) {
            Ok(actual)
        } else {
            tracing::warn!(
                plugin = %self.plugin,
                kind = %kind,
                resource = name,
                "Resource access denied"
            );
            Err(PluginError::access_denied(
                kind,
                &self.plugin,
                name,
                self.allowed(kind).to_vec(),
            ))
        }
    }
}
