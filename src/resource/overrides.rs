use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::ResourceKind;
use crate::error::Result;
use crate::naming;

/// Operator-supplied replacement for a plugin's declared resources.
///
/// A present list replaces the plugin's declared list of that kind entirely;
/// name maps translate a declared name into a different actual name before the
/// isolation prefix is applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_tables: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_topics: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_buckets: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name_map: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_name_map: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_name_map: Option<HashMap<String, String>>,
}

impl ResourceOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tables(mut self, tables: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.allowed_tables = Some(tables.into_iter().map(Into::into).collect());
        self
    }

    pub fn topics(mut self, topics: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.allowed_topics = Some(topics.into_iter().map(Into::into).collect());
        self
    }

    pub fn buckets(mut self, buckets: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.allowed_buckets = Some(buckets.into_iter().map(Into::into).collect());
        self
    }

    pub fn map_table(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.table_name_map
            .get_or_insert_with(HashMap::new)
            .insert(from.into(), to.into());
        self
    }

    pub fn map_topic(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.topic_name_map
            .get_or_insert_with(HashMap::new)
            .insert(from.into(), to.into());
        self
    }

    pub fn map_bucket(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.bucket_name_map
            .get_or_insert_with(HashMap::new)
            .insert(from.into(), to.into());
        self
    }

    pub fn list(&self, kind: ResourceKind) -> Option<&[String]> {
        match kind {
            ResourceKind::Table => self.allowed_tables.as_deref(),
            ResourceKind::Topic => self.allowed_topics.as_deref(),
            ResourceKind::Bucket => self.allowed_buckets.as_deref(),
        }
    }

    pub fn name_map(&self, kind: ResourceKind) -> Option<&HashMap<String, String>> {
        match kind {
            ResourceKind::Table => self.table_name_map.as_ref(),
            ResourceKind::Topic => self.topic_name_map.as_ref(),
            ResourceKind::Bucket => self.bucket_name_map.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        ResourceKind::ALL
            .iter()
            .all(|&kind| self.list(kind).is_none() && self.name_map(kind).is_none())
    }

    /// Checks every overridden name and both sides of every name map.
    pub fn validate(&self) -> Result<()> {
        for kind in ResourceKind::ALL {
            if let Some(list) = self.list(kind) {
                naming::validate_resource_names(kind, list)?;
            }
            if let Some(map) = self.name_map(kind) {
                for (from, to) in map {
                    naming::validate_resource_name(kind, from)?;
                    naming::validate_resource_name(kind, to)?;
                }
            }
        }
        Ok(())
    }
}
