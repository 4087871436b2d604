//! Shared publish/subscribe bus.
//!
//! Listeners run synchronously on the emitting task, in registration order.
//! The listener table lock is released before any listener runs, so
//! listeners may register or remove listeners themselves.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use serde_json::Value;

/// One delivery on the bus.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusEvent {
    pub name: String,
    pub payload: Value,
    /// Plugin that emitted the event; `None` for host emissions.
    pub source: Option<String>,
}

impl BusEvent {
    pub fn is_from(&self, plugin: &str) -> bool {
        self.source.as_deref() == Some(plugin)
    }
}

pub type Listener = Arc<dyn Fn(&BusEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

struct Registration {
    id: ListenerId,
    listener: Listener,
    once: bool,
}

#[derive(Default)]
struct BusInner {
    listeners: Mutex<HashMap<String, Vec<Registration>>>,
    next_id: AtomicU64,
}

/// Event bus shared by the host and every plugin context.
///
/// Cloning yields another handle to the same bus.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, Vec<Registration>>> {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn register(&self, event: &str, listener: Listener, once: bool) -> ListenerId {
        let id = ListenerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.table()
            .entry(event.to_string())
            .or_default()
            .push(Registration { id, listener, once });
        id
    }

    pub fn on<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        self.register(event, Arc::new(listener), false)
    }

    pub fn on_arc(&self, event: &str, listener: Listener) -> ListenerId {
        self.register(event, listener, false)
    }

    /// Registers a listener that is removed before its first invocation.
    pub fn once<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        self.register(event, Arc::new(listener), true)
    }

    /// Removes a listener; returns whether it was still registered.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        let mut table = self.table();
        let Some(registrations) = table.get_mut(event) else {
            return false;
        };
        let before = registrations.len();
        registrations.retain(|r| r.id != id);
        let removed = registrations.len() != before;
        if registrations.is_empty() {
            table.remove(event);
        }
        removed
    }

    /// Emits a host event. Returns the number of listeners invoked.
    pub fn emit(&self, event: &str, payload: Value) -> usize {
        self.dispatch(BusEvent {
            name: event.to_string(),
            payload,
            source: None,
        })
    }

    pub(crate) fn emit_from(&self, source: &str, event: &str, payload: Value) -> usize {
        self.dispatch(BusEvent {
            name: event.to_string(),
            payload,
            source: Some(source.to_string()),
        })
    }

    fn dispatch(&self, event: BusEvent) -> usize {
        let listeners: Vec<Listener> = {
            let mut table = self.table();
            let Some(registrations) = table.get_mut(&event.name) else {
                return 0;
            };
            let listeners = registrations
                .iter()
                .map(|r| Arc::clone(&r.listener))
                .collect();
            registrations.retain(|r| !r.once);
            if registrations.is_empty() {
                table.remove(&event.name);
            }
            listeners
        };

        for listener in &listeners {
            listener(&event);
        }
        listeners.len()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.table().get(event).map(Vec::len).unwrap_or(0)
    }

    pub fn total_listeners(&self) -> usize {
        self.table().values().map(Vec::len).sum()
    }

    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.table().keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("events", &self.event_names())
            .field("listeners", &self.total_listeners())
            .finish()
    }
}
