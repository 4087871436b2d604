//! In-memory service backends.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use serde_json::Value;

use super::{
    DatabaseService, Delivery, Message, MessageHandler, MessagingService, ObjectInfo,
    ObjectStoreService, QueryResult, Row,
};
use crate::error::{PluginError, Result};

/// Records every statement it receives and answers queries with scripted
/// rows.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    statements: Mutex<Vec<(String, Vec<Value>)>>,
    rows: Mutex<Vec<Row>>,
    affected: Mutex<u64>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(self, rows: Vec<Row>) -> Self {
        *self.rows.lock().unwrap_or_else(|e| e.into_inner()) = rows;
        self
    }

    pub fn with_affected(self, affected: u64) -> Self {
        *self.affected.lock().unwrap_or_else(|e| e.into_inner()) = affected;
        self
    }

    /// Statements executed so far, in order, with their parameters.
    pub fn statements(&self) -> Vec<(String, Vec<Value>)> {
        self.statements
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn last_statement(&self) -> Option<String> {
        self.statements
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .map(|(sql, _)| sql.clone())
    }

    fn record(&self, sql: &str, params: &[Value]) {
        self.statements
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((sql.to_string(), params.to_vec()));
    }
}

#[async_trait]
impl DatabaseService for MemoryDatabase {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.record(sql, params);
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner()).clone();
        Ok(QueryResult::from_rows(rows))
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.record(sql, params);
        Ok(*self.affected.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

struct Subscription {
    group_id: String,
    topics: Vec<String>,
    handler: MessageHandler,
}

/// Topic log with synchronous fan-out to subscribers.
#[derive(Default)]
pub struct MemoryBroker {
    topics: DashMap<String, Vec<Message>>,
    subscriptions: Mutex<Vec<Subscription>>,
    consumers: Mutex<HashSet<String>>,
    streams: Mutex<Vec<String>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self, topic: &str) -> Vec<Message> {
        self.topics
            .get(topic)
            .map(|m| m.value().clone())
            .unwrap_or_default()
    }

    pub fn topic_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.topics.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn has_consumer(&self, group_id: &str) -> bool {
        self.consumers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(group_id)
    }

    pub fn stream_statements(&self) -> Vec<String> {
        self.streams
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl std::fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBroker")
            .field("topics", &self.topic_names())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MessagingService for MemoryBroker {
    async fn send(&self, topic: &str, messages: Vec<Message>) -> Result<()> {
        self.topics
            .entry(topic.to_string())
            .or_default()
            .extend(messages.iter().cloned());

        let handlers: Vec<MessageHandler> = self
            .subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|s| s.topics.iter().any(|t| t == topic))
            .map(|s| s.handler.clone())
            .collect();

        for message in messages {
            for handler in &handlers {
                handler(Delivery {
                    topic: topic.to_string(),
                    message: message.clone(),
                });
            }
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        group_id: &str,
        topics: &[String],
        handler: MessageHandler,
    ) -> Result<()> {
        if !self.has_consumer(group_id) {
            return Err(PluginError::service(
                "messaging",
                format!("no consumer for group '{}'", group_id),
            ));
        }
        self.subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Subscription {
                group_id: group_id.to_string(),
                topics: topics.to_vec(),
                handler,
            });
        Ok(())
    }

    async fn create_consumer(&self, group_id: &str) -> Result<()> {
        self.consumers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(group_id.to_string());
        Ok(())
    }

    async fn disconnect_consumer(&self, group_id: &str) -> Result<()> {
        self.consumers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(group_id);
        self.subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|s| s.group_id != group_id);
        Ok(())
    }

    async fn execute_stream(&self, statement: &str) -> Result<Value> {
        self.streams
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(statement.to_string());
        Ok(serde_json::json!({ "status": "SUCCESS", "statement": statement }))
    }
}

/// Bucket → key → bytes.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    buckets: DashMap<String, BTreeMap<String, Bytes>>,
    content_types: DashMap<(String, String), String>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bucket_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.buckets.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn content_type(&self, bucket: &str, key: &str) -> Option<String> {
        self.content_types
            .get(&(bucket.to_string(), key.to_string()))
            .map(|c| c.value().clone())
    }

    fn not_found(bucket: &str, key: &str) -> PluginError {
        PluginError::service(
            "object store",
            format!("object '{}' not found in bucket '{}'", key, bucket),
        )
    }
}

#[async_trait]
impl ObjectStoreService for MemoryObjectStore {
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> Result<()> {
        self.buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), data);
        if let Some(content_type) = content_type {
            self.content_types.insert(
                (bucket.to_string(), key.to_string()),
                content_type.to_string(),
            );
        }
        Ok(())
    }

    async fn download(&self, bucket: &str, key: &str) -> Result<Bytes> {
        self.buckets
            .get(bucket)
            .and_then(|objects| objects.get(key).cloned())
            .ok_or_else(|| Self::not_found(bucket, key))
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        if let Some(mut objects) = self.buckets.get_mut(bucket) {
            objects.remove(key);
        }
        self.content_types
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: Option<&str>) -> Result<Vec<ObjectInfo>> {
        let Some(objects) = self.buckets.get(bucket) else {
            return Ok(Vec::new());
        };
        Ok(objects
            .iter()
            .filter(|(key, _)| prefix.is_none_or(|p| key.starts_with(p)))
            .map(|(key, data)| ObjectInfo {
                key: key.clone(),
                size: data.len() as u64,
            })
            .collect())
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        Ok(self
            .buckets
            .get(bucket)
            .is_some_and(|objects| objects.contains_key(key)))
    }

    async fn presign(&self, bucket: &str, key: &str, expires_in: Duration) -> Result<String> {
        Ok(format!(
            "memory://{}/{}?expires={}",
            bucket,
            key,
            expires_in.as_secs()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_database_records_statements() {
        let mut row = Row::new();
        row.insert("id".into(), Value::from(1));
        let db = MemoryDatabase::new().with_rows(vec![row]).with_affected(3);

        let result = db.query("SELECT * FROM p_users", &[Value::from(1)]).await.unwrap();
        assert_eq!(result.row_count, 1);
        assert_eq!(db.execute("DELETE FROM p_users", &[]).await.unwrap(), 3);
        assert_eq!(db.statements().len(), 2);
        assert_eq!(db.last_statement().as_deref(), Some("DELETE FROM p_users"));
    }

    #[tokio::test]
    async fn test_broker_fan_out() {
        let broker = MemoryBroker::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);

        assert!(
            broker
                .subscribe("g", &["t".to_string()], Arc::new(|_: Delivery| {}))
                .await
                .is_err()
        );

        broker.create_consumer("g").await.unwrap();
        broker
            .subscribe(
                "g",
                &["t".to_string()],
                Arc::new(move |d: Delivery| {
                    assert_eq!(d.topic, "t");
                    seen.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .await
            .unwrap();

        broker
            .send("t", vec![Message::new(Value::from(1)), Message::new(Value::from(2))])
            .await
            .unwrap();
        broker.send("other", vec![Message::new(Value::Null)]).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(broker.messages("t").len(), 2);

        broker.disconnect_consumer("g").await.unwrap();
        broker.send("t", vec![Message::new(Value::Null)]).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(broker.topic_names(), vec!["other", "t"]);
    }

    #[tokio::test]
    async fn test_object_store() {
        let store = MemoryObjectStore::new();
        store
            .upload("b", "docs/a.txt", Bytes::from_static(b"hello"), Some("text/plain"))
            .await
            .unwrap();
        store.upload("b", "img/x.png", Bytes::from_static(b"x"), None).await.unwrap();

        assert_eq!(store.download("b", "docs/a.txt").await.unwrap(), Bytes::from_static(b"hello"));
        assert!(store.download("b", "missing").await.is_err());
        assert_eq!(store.content_type("b", "docs/a.txt").as_deref(), Some("text/plain"));

        let listed = store.list("b", Some("docs/")).await.unwrap();
        assert_eq!(listed, vec![ObjectInfo { key: "docs/a.txt".into(), size: 5 }]);

        store.delete("b", "docs/a.txt").await.unwrap();
        assert!(!store.exists("b", "docs/a.txt").await.unwrap());
        assert_eq!(
            store.presign("b", "img/x.png", Duration::from_secs(60)).await.unwrap(),
            "memory://b/img/x.png?expires=60"
        );
    }
}
