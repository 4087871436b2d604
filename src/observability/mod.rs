//! Metrics and structured spans for the plugin host.
//!
//! The crate installs no subscriber. Embedders pick their own, e.g.
//!
//! ```rust,ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("plugin_host=debug")
//!     .init();
//! ```

mod metrics;
mod spans;

pub use metrics::{Counter, Gauge, Histogram, HostMetrics, MetricsSummary};
pub use spans::{LifecycleTimer, lifecycle_span};
