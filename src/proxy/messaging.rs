use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use super::{AccessGate, StatementRewriter};
use crate::error::Result;
use crate::resource::ResourceKind;
use crate::services::{Delivery, Message, MessageHandler, MessagingService};

/// Messaging access restricted to the plugin's topics.
#[derive(Clone)]
pub struct MessagingProxy {
    gate: AccessGate,
    service: Arc<dyn MessagingService>,
    rewriter: Arc<dyn StatementRewriter>,
}

impl MessagingProxy {
    pub(crate) fn new(
        gate: AccessGate,
        service: Arc<dyn MessagingService>,
        rewriter: Arc<dyn StatementRewriter>,
    ) -> Self {
        Self {
            gate,
            service,
            rewriter,
        }
    }

    pub async fn send_message(&self, topic: &str, messages: Vec<Message>) -> Result<()> {
        let actual = self.gate.check(ResourceKind::Topic, topic)?;
        self.service.send(&actual, messages).await
    }

    /// Subscribes `handler` to `topics` under `group_id`.
    ///
    /// Deliveries carry the topic name the plugin subscribed with, and stop
    /// once the plugin's context is invalidated.
    pub async fn subscribe<S: AsRef<str>>(
        &self,
        group_id: &str,
        topics: &[S],
        handler: MessageHandler,
    ) -> Result<()> {
        let mut requested: HashMap<String, String> = HashMap::with_capacity(topics.len());
        for topic in topics {
            let topic = topic.as_ref();
            let actual = self.gate.check(ResourceKind::Topic, topic)?;
            requested.insert(actual, topic.to_string());
        }
        let actual_topics: Vec<String> = requested.keys().cloned().collect();

        let gate = self.gate.clone();
        let wrapped: MessageHandler = Arc::new(move |delivery: Delivery| {
            if !gate.is_live() {
                return;
            }
            let topic = requested
                .get(&delivery.topic)
                .cloned()
                .unwrap_or(delivery.topic);
            handler(Delivery {
                topic,
                message: delivery.message,
            });
        });

        self.service
            .subscribe(group_id, &actual_topics, wrapped)
            .await
    }

    pub async fn create_consumer(&self, group_id: &str) -> Result<()> {
        self.gate.ensure()?;
        self.service.create_consumer(group_id).await
    }

    pub async fn disconnect_consumer(&self, group_id: &str) -> Result<()> {
        self.gate.ensure()?;
        self.service.disconnect_consumer(group_id).await
    }

    /// Runs a streaming statement after checking and rewriting its topic
    /// declarations.
    pub async fn execute_stream_query(&self, statement: &str) -> Result<Value> {
        self.gate.ensure()?;
        let statement = self
            .rewriter
            .rewrite_stream_topics(statement, &|topic| self.gate.check(ResourceKind::Topic, topic))?;
        self.service.execute_stream(&statement).await
    }

    pub fn get_allowed_topics(&self) -> Result<Vec<String>> {
        self.gate.allowed(ResourceKind::Topic)
    }
}

impl std::fmt::Debug for MessagingProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagingProxy")
            .field("plugin", &self.gate.plugin())
            .finish_non_exhaustive()
    }
}
