//! Naming rules for plugins and the resources they declare.
//!
//! Every validator returns [`PluginError::InvalidNamingConvention`] with a
//! human readable reason instead of silently normalizing the input.

use std::collections::HashSet;
use std::net::Ipv4Addr;

use crate::error::{PluginError, Result};
use crate::resource::ResourceKind;

pub const PLUGIN_NAME_MAX: usize = 63;
pub const TABLE_NAME_MAX: usize = 63;
pub const TOPIC_NAME_MAX: usize = 249;
pub const BUCKET_NAME_MIN: usize = 3;
pub const BUCKET_NAME_MAX: usize = 63;

/// Identifier prefixes owned by database system catalogs. Statement scanning
/// leaves them untouched, so no plugin may own an isolation prefix that
/// starts with one.
pub const CATALOG_PREFIXES: [&str; 2] = ["pg_", "sqlite_"];
pub const CATALOG_SCHEMA: &str = "information_schema";

/// Whether `name` is a system catalog identifier.
pub fn is_catalog_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower == CATALOG_SCHEMA || CATALOG_PREFIXES.iter().any(|p| lower.starts_with(p))
}

fn check_length(kind: &'static str, name: &str, min: usize, max: usize) -> Result<()> {
    let len = name.chars().count();
    if len < min || len > max {
        return Err(PluginError::naming(
            kind,
            name,
            format!("length must be between {} and {} characters", min, max),
        ));
    }
    Ok(())
}

fn check_charset(kind: &'static str, name: &str, extra: &[char]) -> Result<()> {
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || extra.contains(c)))
    {
        let allowed: String = extra.iter().map(|c| format!("'{}'", c)).collect::<Vec<_>>().join(", ");
        return Err(PluginError::naming(
            kind,
            name,
            format!(
                "invalid character '{}'; only lowercase letters, digits and {} are allowed",
                bad, allowed
            ),
        ));
    }
    Ok(())
}

fn check_no_trailing(kind: &'static str, name: &str, forbidden: &[char]) -> Result<()> {
    if let Some(last) = name.chars().last()
        && forbidden.contains(&last)
    {
        return Err(PluginError::naming(
            kind,
            name,
            format!("must not end with '{}'", last),
        ));
    }
    Ok(())
}

fn check_no_consecutive(kind: &'static str, name: &str, separators: &[char]) -> Result<()> {
    let chars: Vec<char> = name.chars().collect();
    if chars
        .windows(2)
        .any(|w| separators.contains(&w[0]) && separators.contains(&w[1]))
    {
        return Err(PluginError::naming(
            kind,
            name,
            "must not contain consecutive separators",
        ));
    }
    Ok(())
}

/// Plugin names: 1-63 chars of `[a-z0-9_-]`, starting alphanumeric,
/// not ending with a separator, no consecutive separators.
pub fn validate_plugin_name(name: &str) -> Result<()> {
    const KIND: &str = "plugin";
    check_length(KIND, name, 1, PLUGIN_NAME_MAX)?;
    check_charset(KIND, name, &['-', '_'])?;
    if !name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return Err(PluginError::naming(
            KIND,
            name,
            "must start with a lowercase letter or digit",
        ));
    }
    check_no_trailing(KIND, name, &['-', '_'])?;
    check_no_consecutive(KIND, name, &['-', '_'])?;
    if name == CATALOG_SCHEMA || is_catalog_name(&format!("{}_", name)) {
        return Err(PluginError::naming(
            KIND,
            name,
            "is reserved: its resources would collide with database system catalogs",
        ));
    }
    Ok(())
}

/// Table names: 1-63 chars of `[a-z0-9_]`, starting with a letter or `_`.
pub fn validate_table_name(name: &str) -> Result<()> {
    const KIND: &str = "table";
    check_length(KIND, name, 1, TABLE_NAME_MAX)?;
    check_charset(KIND, name, &['_'])?;
    if !name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
    {
        return Err(PluginError::naming(
            KIND,
            name,
            "must start with a lowercase letter or underscore",
        ));
    }
    check_no_trailing(KIND, name, &['_'])?;
    check_no_consecutive(KIND, name, &['_'])
}

/// Topic names: 1-249 chars of `[a-z0-9._-]`, not ending with `.`, no `..`.
pub fn validate_topic_name(name: &str) -> Result<()> {
    const KIND: &str = "topic";
    check_length(KIND, name, 1, TOPIC_NAME_MAX)?;
    check_charset(KIND, name, &['.', '-', '_'])?;
    check_no_trailing(KIND, name, &['.'])?;
    check_no_consecutive(KIND, name, &['.'])
}

/// Bucket names: 3-63 chars of `[a-z0-9.-]`, not ending with `-` or `.`,
/// no `..`, and never shaped like a dotted IPv4 address.
pub fn validate_bucket_name(name: &str) -> Result<()> {
    const KIND: &str = "bucket";
    check_length(KIND, name, BUCKET_NAME_MIN, BUCKET_NAME_MAX)?;
    check_charset(KIND, name, &['.', '-'])?;
    check_no_trailing(KIND, name, &['-', '.'])?;
    check_no_consecutive(KIND, name, &['.'])?;
    if name.parse::<Ipv4Addr>().is_ok() || looks_like_ipv4(name) {
        return Err(PluginError::naming(
            KIND,
            name,
            "must not be formatted as an IP address",
        ));
    }
    Ok(())
}

// Four dot-separated groups of 1-3 digits, without range checking.
fn looks_like_ipv4(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts
            .iter()
            .all(|p| (1..=3).contains(&p.len()) && p.chars().all(|c| c.is_ascii_digit()))
}

pub fn validate_resource_name(kind: ResourceKind, name: &str) -> Result<()> {
    match kind {
        ResourceKind::Table => validate_table_name(name),
        ResourceKind::Topic => validate_topic_name(name),
        ResourceKind::Bucket => validate_bucket_name(name),
    }
}

/// Validates every name in a declared or overridden list and rejects
/// duplicates within the list.
pub fn validate_resource_names<S: AsRef<str>>(kind: ResourceKind, names: &[S]) -> Result<()> {
    let mut seen = HashSet::with_capacity(names.len());
    for name in names {
        let name = name.as_ref();
        validate_resource_name(kind, name)?;
        if !seen.insert(name) {
            return Err(PluginError::naming(
                kind.as_str(),
                name,
                "duplicate entry in resource list",
            ));
        }
    }
    Ok(())
}
