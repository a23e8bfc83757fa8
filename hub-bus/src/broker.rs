//! Broker producer trait and the in-process implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::BusResult;

/// Producer half of a messaging broker.
#[async_trait]
pub trait BrokerProducer: Send + Sync {
    /// Sends one JSON payload to a topic.
    async fn send(&self, topic: &str, payload: &Value) -> BusResult<()>;
}

/// In-process broker retaining published payloads per topic.
///
/// Used by tests and by deployments that run without a broker; in the
/// latter case it is effectively a bounded drop-box that keeps the most
/// recent payloads inspectable.
#[derive(Debug)]
pub struct LocalBroker {
    topics: RwLock<HashMap<String, Vec<Value>>>,
    retain: usize,
}

impl Default for LocalBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalBroker {
    /// Creates a broker retaining up to 1024 payloads per topic.
    #[must_use]
    pub fn new() -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            retain: 1024,
        }
    }

    /// Returns the payloads published to a topic, oldest first.
    #[must_use]
    pub async fn topic(&self, name: &str) -> Vec<Value> {
        self.topics
            .read()
            .await
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the names of all topics that received at least one payload.
    #[must_use]
    pub async fn topic_names(&self) -> Vec<String> {
        self.topics.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl BrokerProducer for LocalBroker {
    async fn send(&self, topic: &str, payload: &Value) -> BusResult<()> {
        let mut topics = self.topics.write().await;
        let entries = topics.entry(topic.to_owned()).or_default();
        entries.push(payload.clone());
        if entries.len() > self.retain {
            let excess = entries.len() - self.retain;
            entries.drain(..excess);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn retains_per_topic_payloads() {
        let broker = LocalBroker::new();
        broker.send("a", &json!({"n": 1})).await.unwrap();
        broker.send("a", &json!({"n": 2})).await.unwrap();
        broker.send("b", &json!({"n": 3})).await.unwrap();

        assert_eq!(broker.topic("a").await.len(), 2);
        assert_eq!(broker.topic("b").await[0]["n"], 3);
        assert!(broker.topic("c").await.is_empty());
    }
}
