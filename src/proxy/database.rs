use std::sync::Arc;

use serde_json::Value;

use super::{AccessGate, StatementRewriter};
use crate::error::Result;
use crate::resource::ResourceKind;
use crate::services::{DatabaseService, QueryResult};

/// Database access restricted to the plugin's tables.
///
/// Statement text is scanned for table references, each one is checked and
/// rewritten to its isolated name before the statement reaches the service.
#[derive(Clone)]
pub struct DatabaseProxy {
    gate: AccessGate,
    service: Arc<dyn DatabaseService>,
    rewriter: Arc<dyn StatementRewriter>,
}

impl DatabaseProxy {
    pub(crate) fn new(
        gate: AccessGate,
        service: Arc<dyn DatabaseService>,
        rewriter: Arc<dyn StatementRewriter>,
    ) -> Self {
        Self {
            gate,
            service,
            rewriter,
        }
    }

    /// Checks and rewrites `sql` without executing it.
    pub fn prepare(&self, sql: &str) -> Result<String> {
        self.gate.ensure()?;
        self.rewriter
            .rewrite_tables(sql, &|table| self.gate.check(ResourceKind::Table, table))
    }

    pub async fn execute_query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let sql = self.prepare(sql)?;
        self.service.query(&sql, params).await
    }

    pub async fn execute_command(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let sql = self.prepare(sql)?;
        self.service.execute(&sql, params).await
    }

    pub fn get_allowed_tables(&self) -> Result<Vec<String>> {
        self.gate.allowed(ResourceKind::Table)
    }
}

impl std::fmt::Debug for DatabaseProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseProxy")
            .field("plugin", &self.gate.plugin())
            .finish_non_exhaustive()
    }
}
