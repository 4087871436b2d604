use std::collections::HashSet;

use super::DependencyGraph;
use crate::error::{PluginError, Result};
use crate::plugin::PluginMetadata;

/// Stateless dependency checks run before a plugin is accepted.
pub struct DependencyResolver;

impl DependencyResolver {
    /// Rejects self-dependencies and dependencies that are not loaded.
    pub fn validate<F>(plugin: &str, dependencies: &[String], is_loaded: F) -> Result<()>
    where
        F: Fn(&str) -> bool,
    {
        if dependencies.iter().any(|d| d == plugin) {
            return Err(PluginError::SelfDependency {
                plugin: plugin.to_string(),
            });
        }
        if let Some(missing) = dependencies.iter().find(|d| !is_loaded(d)) {
            return Err(PluginError::DependencyNotFound {
                plugin: plugin.to_string(),
                dependency: missing.clone(),
            });
        }
        Ok(())
    }

    /// Walks the dependencies of `plugin` through `graph` and fails if the
    /// walk returns to a plugin already on the current path.
    ///
    /// The edges `graph` holds for `plugin` itself are ignored, so this can
    /// check a replacement before the old instance is unloaded.
    pub fn check_circular(
        plugin: &str,
        dependencies: &[String],
        graph: &DependencyGraph,
    ) -> Result<()> {
        let mut path = vec![plugin.to_string()];
        let mut finished = HashSet::new();
        for dependency in dependencies {
            Self::visit(plugin, dependency, graph, &mut path, &mut finished)?;
        }
        Ok(())
    }

    fn visit(
        origin: &str,
        node: &str,
        graph: &DependencyGraph,
        path: &mut Vec<String>,
        finished: &mut HashSet<String>,
    ) -> Result<()> {
        if let Some(start) = path.iter().position(|p| p == node) {
            let mut chain = path[start..].to_vec();
            chain.push(node.to_string());
            return Err(PluginError::CircularDependency {
                plugin: origin.to_string(),
                chain,
            });
        }
        if finished.contains(node) {
            return Ok(());
        }

        path.push(node.to_string());
        for next in graph.dependencies_of(node) {
            Self::visit(origin, next, graph, path, finished)?;
        }
        path.pop();
        finished.insert(node.to_string());
        Ok(())
    }

    /// Orders `pending` so every plugin follows its dependencies.
    ///
    /// Repeated passes pick every plugin whose dependencies are all in
    /// `loaded` or already picked; passes stop when one picks nothing.
    pub fn plan(pending: &[PluginMetadata], loaded: &HashSet<String>) -> LoadPlan {
        let mut available: HashSet<&str> = loaded.iter().map(String::as_str).collect();
        let mut remaining: Vec<usize> = (0..pending.len()).collect();
        let mut order = Vec::with_capacity(pending.len());

        loop {
            let (ready, blocked): (Vec<usize>, Vec<usize>) =
                remaining.iter().partition(|&&i| {
                    pending[i]
                        .dependencies
                        .iter()
                        .all(|d| d != &pending[i].name && available.contains(d.as_str()))
                });
            remaining = blocked;
            if ready.is_empty() {
                break;
            }
            for &i in &ready {
                available.insert(pending[i].name.as_str());
            }
            order.extend(ready);
        }

        let mut unresolved: Vec<String> =
            remaining.iter().map(|&i| pending[i].name.clone()).collect();
        unresolved.sort();
        LoadPlan { order, unresolved }
    }
}

/// Result of [`DependencyResolver::plan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadPlan {
    /// Indices into the pending list, dependencies first.
    pub order: Vec<usize>,
    /// Names whose dependencies can never be satisfied, sorted.
    pub unresolved: Vec<String>,
}

impl LoadPlan {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}
