use std::collections::BTreeMap;

/// Declared dependencies of every loaded (or loading) plugin.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: BTreeMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, plugin: impl Into<String>, dependencies: Vec<String>) {
        self.edges.insert(plugin.into(), dependencies);
    }

    pub fn remove(&mut self, plugin: &str) -> Option<Vec<String>> {
        self.edges.remove(plugin)
    }

    pub fn dependencies_of(&self, plugin: &str) -> &[String] {
        self.edges.get(plugin).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Plugins that declare `plugin` as a dependency, sorted.
    pub fn dependents_of(&self, plugin: &str) -> Vec<String> {
        self.edges
            .iter()
            .filter(|(_, deps)| deps.iter().any(|d| d == plugin))
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}
