//! Interfaces of the external backing services a plugin can reach through
//! its proxies, plus in-memory implementations.
//!
//! Services always receive already isolated names; they know nothing about
//! plugins.

mod memory;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

pub use memory::{MemoryBroker, MemoryDatabase, MemoryObjectStore};

pub type Row = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub row_count: usize,
}

impl QueryResult {
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self {
            row_count: rows.len(),
            rows,
        }
    }
}

#[async_trait]
pub trait DatabaseService: Send + Sync {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Executes a statement and returns the number of affected rows.
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub value: Value,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

impl Message {
    pub fn new(value: Value) -> Self {
        Self {
            key: None,
            value,
            headers: HashMap::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// A message delivered to a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub topic: String,
    pub message: Message,
}

pub type MessageHandler = Arc<dyn Fn(Delivery) + Send + Sync>;

#[async_trait]
pub trait MessagingService: Send + Sync {
    async fn send(&self, topic: &str, messages: Vec<Message>) -> Result<()>;

    async fn subscribe(&self, group_id: &str, topics: &[String], handler: MessageHandler)
    -> Result<()>;

    async fn create_consumer(&self, group_id: &str) -> Result<()>;

    async fn disconnect_consumer(&self, group_id: &str) -> Result<()>;

    /// Runs a streaming-query statement and returns the service's response.
    async fn execute_stream(&self, statement: &str) -> Result<Value>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
}

#[async_trait]
pub trait ObjectStoreService: Send + Sync {
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> Result<()>;

    async fn download(&self, bucket: &str, key: &str) -> Result<Bytes>;

    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;

    async fn list(&self, bucket: &str, prefix: Option<&str>) -> Result<Vec<ObjectInfo>>;

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool>;

    async fn presign(&self, bucket: &str, key: &str, expires_in: Duration) -> Result<String>;
}

/// The optional backing services a host was configured with.
#[derive(Clone, Default)]
pub struct Services {
    pub database: Option<Arc<dyn DatabaseService>>,
    pub messaging: Option<Arc<dyn MessagingService>>,
    pub object_store: Option<Arc<dyn ObjectStoreService>>,
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database(mut self, database: Arc<dyn DatabaseService>) -> Self {
        self.database = Some(database);
        self
    }

    pub fn with_messaging(mut self, messaging: Arc<dyn MessagingService>) -> Self {
        self.messaging = Some(messaging);
        self
    }

    pub fn with_object_store(mut self, object_store: Arc<dyn ObjectStoreService>) -> Self {
        self.object_store = Some(object_store);
        self
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("database", &self.database.is_some())
            .field("messaging", &self.messaging.is_some())
            .field("object_store", &self.object_store.is_some())
            .finish()
    }
}
