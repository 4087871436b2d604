//! Resource proxies: the only path from a plugin to a backing service.
//!
//! Every proxy resolves the names a plugin passes through its
//! [`ResourceAccess`], rejects anything outside the allowed set, and hands
//! the service the isolated actual name.

mod database;
mod messaging;
mod object_store;
pub mod rewrite;

use std::sync::Arc;

pub use database::DatabaseProxy;
pub use messaging::MessagingProxy;
pub use object_store::ObjectStoreProxy;
pub use rewrite::{RegexRewriter, StatementRewriter};

use crate::context::Liveness;
use crate::error::Result;
use crate::observability::HostMetrics;
use crate::resource::{ResourceAccess, ResourceKind};

/// Liveness plus access checks shared by the proxies of one context.
#[derive(Clone)]
pub(crate) struct AccessGate {
    access: Arc<ResourceAccess>,
    liveness: Liveness,
    metrics: Arc<HostMetrics>,
}

impl AccessGate {
    pub(crate) fn new(
        access: Arc<ResourceAccess>,
        liveness: Liveness,
        metrics: Arc<HostMetrics>,
    ) -> Self {
        Self {
            access,
            liveness,
            metrics,
        }
    }

    fn plugin(&self) -> &str {
        self.access.plugin()
    }

    fn ensure(&self) -> Result<()> {
        self.liveness.ensure()
    }

    fn is_live(&self) -> bool {
        self.liveness.is_valid()
    }

    fn check(&self, kind: ResourceKind, name: &str) -> Result<String> {
        self.ensure()?;
        self.access
            .check(kind, name)
            .inspect_err(|_| self.metrics.record_denial())
    }

    fn allowed(&self, kind: ResourceKind) -> Result<Vec<String>> {
        self.ensure()?;
        Ok(self.access.allowed(kind).to_vec())
    }
}
