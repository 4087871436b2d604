//! Shared event bus and the per-plugin adapter over it.

mod bus;
mod registry;
mod scoped;

pub use bus::{BusEvent, EventBus, Listener, ListenerId};
pub use registry::ListenerRegistry;
pub use scoped::PluginEventBus;
