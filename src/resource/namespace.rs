pub const ISOLATION_SEP: char = '_';

/// Actual resource name for `resource` as seen from plugin `plugin`.
pub fn isolated(plugin: &str, resource: &str) -> String {
    format!("{}{}{}", plugin, ISOLATION_SEP, resource)
}
