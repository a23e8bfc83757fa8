//! Dual-sink event publication.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::warn;

use hub_primitives::{HubEvent, JsonMap, SYSTEM_TENANT};
use hub_store::ContextStore;

use crate::{BrokerProducer, BusResult};

const DEFAULT_AGENT_TOPIC_SUFFIX: &str = "ai.agent.events";
const DEFAULT_HUB_TOPIC_SUFFIX: &str = "hub.events";
const DEFAULT_REPLAY_STREAM_SUFFIX: &str = "hub:events";

/// Publishes hub events to the broker and the per-tenant replay stream.
#[derive(Clone)]
pub struct EventBus {
    producer: Arc<dyn BrokerProducer>,
    store: ContextStore,
    agent_topic_suffix: String,
    hub_topic_suffix: String,
    replay_stream_suffix: String,
}

impl EventBus {
    /// Creates a bus over the given producer and store.
    #[must_use]
    pub fn new(producer: Arc<dyn BrokerProducer>, store: ContextStore) -> Self {
        Self {
            producer,
            store,
            agent_topic_suffix: DEFAULT_AGENT_TOPIC_SUFFIX.to_owned(),
            hub_topic_suffix: DEFAULT_HUB_TOPIC_SUFFIX.to_owned(),
            replay_stream_suffix: DEFAULT_REPLAY_STREAM_SUFFIX.to_owned(),
        }
    }

    /// Overrides the topic suffix used for `agent.*` events.
    #[must_use]
    pub fn with_agent_topic_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.agent_topic_suffix = suffix.into();
        self
    }

    /// Overrides the topic suffix used for all other events.
    #[must_use]
    pub fn with_hub_topic_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.hub_topic_suffix = suffix.into();
        self
    }

    /// Overrides the replay stream suffix.
    #[must_use]
    pub fn with_replay_stream_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.replay_stream_suffix = suffix.into();
        self
    }

    /// Returns the replay stream suffix in use.
    #[must_use]
    pub fn replay_stream_suffix(&self) -> &str {
        &self.replay_stream_suffix
    }

    /// Publishes an event to both sinks concurrently.
    ///
    /// Failures in either sink are logged and absorbed; neither blocks the
    /// other.
    pub async fn publish(&self, event: &HubEvent) {
        self.publish_inner(event, true).await;
    }

    /// Publishes an event to the broker only, skipping the replay stream.
    ///
    /// Used when re-routing an already persisted event so a replay never
    /// appends a second stream entry.
    pub async fn publish_transient(&self, event: &HubEvent) {
        self.publish_inner(event, false).await;
    }

    async fn publish_inner(&self, event: &HubEvent, persist: bool) {
        let value = event.to_value();
        let Some(payload) = value.as_object() else {
            warn!(event_id = %event.id, "event did not serialize to an object; dropping");
            return;
        };

        let topic = self.resolve_topic(event);
        let stream = self.tenant_stream(&event.tenant_id);

        let broker_send = self.producer.send(&topic, &value);
        let stream_append = async {
            if persist {
                self.store.append_stream(&stream, payload, None).await.map(Some)
            } else {
                Ok(None)
            }
        };
        let (broker_result, stream_result) = tokio::join!(broker_send, stream_append);

        if let Err(err) = broker_result {
            warn!(topic, event_id = %event.id, error = %err, "broker publish failed");
        }
        if let Err(err) = stream_result {
            warn!(stream, event_id = %event.id, error = %err, "replay stream append failed");
        }
    }

    /// Validates a raw payload into a hub event and publishes it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BusError::Validation`] when the payload is not a
    /// valid event.
    pub async fn publish_raw(&self, payload: Value) -> BusResult<()> {
        let event = HubEvent::from_value(payload)?;
        self.publish(&event).await;
        Ok(())
    }

    /// Wraps an agent response into an `agent.response` event and publishes
    /// it.
    pub async fn emit_agent_response(
        &self,
        tenant_id: &str,
        agent_name: &str,
        response: &Value,
        correlation_id: Option<&str>,
    ) {
        let id = response
            .get("id")
            .and_then(Value::as_str)
            .or(correlation_id)
            .unwrap_or(agent_name)
            .to_owned();

        let payload: JsonMap = response.as_object().cloned().unwrap_or_else(|| {
            let mut map = Map::new();
            map.insert("result".to_owned(), response.clone());
            map
        });

        let event = HubEvent {
            id,
            tenant_id: tenant_id.to_owned(),
            event_type: "agent.response".to_owned(),
            source: agent_name.to_owned(),
            timestamp: resolve_timestamp(response),
            payload,
            session_id: None,
            target_agent: None,
            agent_name: Some(agent_name.to_owned()),
            channel: Some("internal".to_owned()),
            correlation_id: correlation_id.map(ToOwned::to_owned),
            metadata: Map::new(),
        };
        self.publish(&event).await;
    }

    fn resolve_topic(&self, event: &HubEvent) -> String {
        let tenant = if event.tenant_id.is_empty() {
            SYSTEM_TENANT
        } else {
            &event.tenant_id
        };
        let suffix = if event.event_type.starts_with("agent.") {
            &self.agent_topic_suffix
        } else {
            &self.hub_topic_suffix
        };
        format!("tenant.{tenant}.{suffix}")
    }

    fn tenant_stream(&self, tenant_id: &str) -> String {
        let tenant = if tenant_id.is_empty() {
            SYSTEM_TENANT
        } else {
            tenant_id
        };
        format!("{tenant}:{}", self.replay_stream_suffix)
    }
}

fn resolve_timestamp(response: &Value) -> DateTime<Utc> {
    if let Some(raw) = response.get("timestamp").and_then(Value::as_str) {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return parsed.with_timezone(&Utc);
        }
        warn!(timestamp = raw, "invalid agent response timestamp");
    }
    Utc::now()
}
