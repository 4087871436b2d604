use std::collections::HashMap;

use dashmap::DashMap;

use super::{EventBus, ListenerId};

/// Tracks every listener each plugin has registered on the shared bus so
/// they can be removed together on unload.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    entries: DashMap<String, HashMap<String, Vec<ListenerId>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, plugin: &str, event: &str, id: ListenerId) {
        self.entries
            .entry(plugin.to_string())
            .or_default()
            .entry(event.to_string())
            .or_default()
            .push(id);
    }

    pub fn forget(&self, plugin: &str, event: &str, id: ListenerId) -> bool {
        let Some(mut events) = self.entries.get_mut(plugin) else {
            return false;
        };
        let Some(ids) = events.get_mut(event) else {
            return false;
        };
        let before = ids.len();
        ids.retain(|&i| i != id);
        let removed = ids.len() != before;
        if ids.is_empty() {
            events.remove(event);
        }
        removed
    }

    pub fn listener_count(&self, plugin: &str) -> usize {
        self.entries
            .get(plugin)
            .map(|events| events.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    pub fn contains(&self, plugin: &str) -> bool {
        self.entries.contains_key(plugin)
    }

    /// Removes every listener recorded for `plugin` from `bus` and deletes
    /// the plugin's entry. Ids no longer on the bus (fired `once`
    /// listeners) are skipped. Returns the number actually removed.
    pub fn teardown(&self, plugin: &str, bus: &EventBus) -> usize {
        let Some((_, events)) = self.entries.remove(plugin) else {
            return 0;
        };
        let mut removed = 0;
        for (event, ids) in events {
            for id in ids {
                if bus.off(&event, id) {
                    removed += 1;
                } else {
                    tracing::debug!(plugin, event = %event, ?id, "Listener already gone during teardown");
                }
            }
        }
        removed
    }
}
