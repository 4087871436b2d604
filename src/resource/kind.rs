use std::fmt;

use serde::{Deserialize, Serialize};

/// The three kinds of external resource a plugin can declare access to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Table,
    Topic,
    Bucket,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [ResourceKind::Table, ResourceKind::Topic, ResourceKind::Bucket];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Table => "table",
            ResourceKind::Topic => "topic",
            ResourceKind::Bucket => "bucket",
        }
    }

    /// Tables are matched case-insensitively because SQL identifiers are.
    pub fn is_case_insensitive(&self) -> bool {
        matches!(self, ResourceKind::Table)
    }

    pub(crate) fn normalize(&self, name: &str) -> String {
        if self.is_case_insensitive() {
            name.to_lowercase()
        } else {
            name.to_string()
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
