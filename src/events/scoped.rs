//! Per-plugin view of the shared bus.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use serde_json::Value;

use super::{BusEvent, EventBus, ListenerId, ListenerRegistry};
use crate::context::Liveness;
use crate::error::Result;
use crate::observability::HostMetrics;

/// Event bus handle scoped to one plugin's identity.
///
/// Outgoing events are tagged with the plugin name, the plugin never
/// receives its own events, and every listener is recorded so the host can
/// remove them all when the plugin unloads.
#[derive(Clone)]
pub struct PluginEventBus {
    plugin: Arc<str>,
    bus: EventBus,
    registry: Arc<ListenerRegistry>,
    liveness: Liveness,
    metrics: Arc<HostMetrics>,
}

impl PluginEventBus {
    pub(crate) fn new(
        plugin: &str,
        bus: EventBus,
        registry: Arc<ListenerRegistry>,
        liveness: Liveness,
        metrics: Arc<HostMetrics>,
    ) -> Self {
        Self {
            plugin: Arc::from(plugin),
            bus,
            registry,
            liveness,
            metrics,
        }
    }

    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    pub fn emit(&self, event: &str, payload: Value) -> Result<usize> {
        self.liveness.ensure()?;
        self.metrics.events_emitted.inc();
        Ok(self.bus.emit_from(&self.plugin, event, payload))
    }

    pub fn on<F>(&self, event: &str, listener: F) -> Result<ListenerId>
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        self.liveness.ensure()?;
        let plugin = Arc::clone(&self.plugin);
        let id = self.bus.on(event, move |e: &BusEvent| {
            if !e.is_from(&plugin) {
                listener(e);
            }
        });
        self.registry.record(&self.plugin, event, id);
        tracing::debug!(plugin = %self.plugin, event, ?id, "Listener registered");
        Ok(id)
    }

    /// Registers a listener consumed by its first delivery from another
    /// plugin or the host. Self-emitted events do not consume it.
    pub fn once<F>(&self, event: &str, listener: F) -> Result<ListenerId>
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        self.liveness.ensure()?;
        let plugin = Arc::clone(&self.plugin);
        let bus = self.bus.clone();
        let registry = Arc::clone(&self.registry);
        let fired = AtomicBool::new(false);
        let own_id: Arc<OnceLock<ListenerId>> = Arc::new(OnceLock::new());
        let slot = Arc::clone(&own_id);

        let id = self.bus.on(event, move |e: &BusEvent| {
            if e.is_from(&plugin) || fired.swap(true, Ordering::SeqCst) {
                return;
            }
            if let Some(&id) = slot.get() {
                bus.off(&e.name, id);
                registry.forget(&plugin, &e.name, id);
            }
            listener(e);
        });
        let _ = own_id.set(id);
        self.registry.record(&self.plugin, event, id);
        Ok(id)
    }

    pub fn off(&self, event: &str, id: ListenerId) -> Result<bool> {
        self.liveness.ensure()?;
        let forgotten = self.registry.forget(&self.plugin, event, id);
        // only listeners this plugin registered may be removed through it
        if !forgotten {
            return Ok(false);
        }
        Ok(self.bus.off(event, id))
    }

    pub fn listener_count(&self) -> usize {
        self.registry.listener_count(&self.plugin)
    }
}

impl std::fmt::Debug for PluginEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginEventBus")
            .field("plugin", &self.plugin)
            .field("listeners", &self.listener_count())
            .field("valid", &self.liveness.is_valid())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PluginError;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn scoped(bus: &EventBus, registry: &Arc<ListenerRegistry>, plugin: &str) -> (PluginEventBus, Liveness) {
        let liveness = Liveness::new(plugin);
        (
            PluginEventBus::new(
                plugin,
                bus.clone(),
                Arc::clone(registry),
                liveness.clone(),
                Arc::new(HostMetrics::new()),
            ),
            liveness,
        )
    }

    #[test]
    fn test_no_self_delivery() {
        let bus = EventBus::new();
        let registry = Arc::new(ListenerRegistry::new());
        let (a, _) = scoped(&bus, &registry, "a");
        let (b, _) = scoped(&bus, &registry, "b");

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        a.on("ping", move |e| sink.lock().unwrap().push(e.source.clone()))
            .unwrap();

        a.emit("ping", Value::Null).unwrap();
        b.emit("ping", serde_json::json!({"from": "b"})).unwrap();
        bus.emit("ping", Value::Null);

        assert_eq!(
            *received.lock().unwrap(),
            vec![Some("b".to_string()), None]
        );
    }

    #[test]
    fn test_once_ignores_self_events() {
        let bus = EventBus::new();
        let registry = Arc::new(ListenerRegistry::new());
        let (a, _) = scoped(&bus, &registry, "a");
        let (b, _) = scoped(&bus, &registry, "b");

        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        a.once("ready", move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        a.emit("ready", Value::Null).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(a.listener_count(), 1);

        b.emit("ready", Value::Null).unwrap();
        b.emit("ready", Value::Null).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(a.listener_count(), 0);
        assert_eq!(bus.listener_count("ready"), 0);
    }

    #[test]
    fn test_off_only_removes_own_listeners() {
        let bus = EventBus::new();
        let registry = Arc::new(ListenerRegistry::new());
        let (a, _) = scoped(&bus, &registry, "a");
        let (b, _) = scoped(&bus, &registry, "b");

        let id = a.on("x", |_| {}).unwrap();
        assert!(!b.off("x", id).unwrap());
        assert_eq!(bus.listener_count("x"), 1);
        assert!(a.off("x", id).unwrap());
        assert_eq!(bus.listener_count("x"), 0);
    }

    #[test]
    fn test_invalidated_handle_fails() {
        let bus = EventBus::new();
        let registry = Arc::new(ListenerRegistry::new());
        let (a, liveness) = scoped(&bus, &registry, "a");
        liveness.invalidate();

        assert!(matches!(
            a.emit("x", Value::Null),
            Err(PluginError::ContextInvalidated { .. })
        ));
        assert!(a.on("x", |_| {}).is_err());
        assert!(a.once("x", |_| {}).is_err());
        assert!(bus.event_names().is_empty());
    }
}
