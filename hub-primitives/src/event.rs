//! Hub event and channel message schemas.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ValidationError, ValidationResult};

/// Opaque JSON object carried by events, payloads, and session scratch.
pub type JsonMap = serde_json::Map<String, Value>;

/// The unit of work crossing the router boundary.
///
/// Constructed at ingest and immutable afterwards; persisted verbatim to the
/// per-tenant replay stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubEvent {
    /// Caller-assigned event identifier.
    pub id: String,
    /// Tenant the event belongs to.
    pub tenant_id: String,
    /// Event type, e.g. `channel.message` or `agent.response`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Originating system or channel.
    pub source: String,
    /// Ingest timestamp.
    pub timestamp: DateTime<Utc>,
    /// Opaque event payload.
    #[serde(default)]
    pub payload: JsonMap,
    /// Session the event participates in, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Explicit dispatch target; takes precedence over `agent_name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_agent: Option<String>,
    /// Agent hint supplied by the channel adapter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    /// Communication channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Correlation id threading a request/response pair.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: JsonMap,
}

impl HubEvent {
    /// Returns the agent this event should be dispatched to, if any.
    ///
    /// `target_agent` wins over `agent_name`.
    #[must_use]
    pub fn resolved_agent(&self) -> Option<&str> {
        self.target_agent
            .as_deref()
            .or(self.agent_name.as_deref())
    }

    /// Validates a raw JSON payload into an event.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the payload does not satisfy the
    /// event schema.
    pub fn from_value(value: Value) -> ValidationResult<Self> {
        let event: Self = serde_json::from_value(value)
            .map_err(|err| ValidationError::decode("HubEvent", err))?;
        if event.id.is_empty() {
            return Err(ValidationError::field(
                "HubEvent",
                "id",
                "must not be empty",
            ));
        }
        Ok(event)
    }

    /// Serializes the event to its wire representation (camelCase keys).
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Direction of a channel message relative to the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Message received from the channel.
    Inbound,
    /// Message produced by the hub for the channel.
    Outbound,
}

/// Message emitted by a channel adapter, converted 1:1 into a [`HubEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMessage {
    /// Adapter-assigned message identifier.
    pub id: String,
    /// Tenant the message belongs to.
    pub tenant_id: String,
    /// Session the message participates in, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Agent hint supplied by the adapter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    /// Channel the message travelled on.
    pub channel: String,
    /// Message direction.
    pub direction: Direction,
    /// Opaque message payload.
    #[serde(default)]
    pub payload: JsonMap,
    /// Adapter timestamp.
    pub timestamp: DateTime<Utc>,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: JsonMap,
}

impl ChannelMessage {
    /// Converts the message into its hub event representation.
    #[must_use]
    pub fn into_event(self) -> HubEvent {
        HubEvent {
            id: self.id,
            tenant_id: self.tenant_id,
            event_type: "channel.message".to_owned(),
            source: self.channel.clone(),
            timestamp: self.timestamp,
            payload: self.payload,
            session_id: self.session_id,
            target_agent: None,
            agent_name: self.agent_name,
            channel: Some(self.channel),
            correlation_id: None,
            metadata: self.metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_camel_case_wire_payload() {
        let event = HubEvent::from_value(json!({
            "id": "e1",
            "tenantId": "t1",
            "type": "note",
            "source": "api",
            "timestamp": "2026-01-05T10:00:00Z",
            "payload": {"k": "v"},
            "sessionId": "s1",
            "targetAgent": "greeter",
        }))
        .unwrap();

        assert_eq!(event.tenant_id, "t1");
        assert_eq!(event.event_type, "note");
        assert_eq!(event.session_id.as_deref(), Some("s1"));
        assert_eq!(event.resolved_agent(), Some("greeter"));
    }

    #[test]
    fn round_trips_through_wire_casing() {
        let event = HubEvent::from_value(json!({
            "id": "e2",
            "tenantId": "t1",
            "type": "note",
            "source": "api",
            "timestamp": "2026-01-05T10:00:00Z",
        }))
        .unwrap();

        let value = event.to_value();
        assert_eq!(value["tenantId"], "t1");
        assert_eq!(value["type"], "note");
        let back = HubEvent::from_value(value).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn target_agent_beats_agent_name() {
        let event = HubEvent::from_value(json!({
            "id": "e3",
            "tenantId": "t1",
            "type": "note",
            "source": "api",
            "timestamp": "2026-01-05T10:00:00Z",
            "targetAgent": "a",
            "agentName": "b",
        }))
        .unwrap();
        assert_eq!(event.resolved_agent(), Some("a"));
    }

    #[test]
    fn rejects_empty_id() {
        let err = HubEvent::from_value(json!({
            "id": "",
            "tenantId": "t1",
            "type": "note",
            "source": "api",
            "timestamp": "2026-01-05T10:00:00Z",
        }))
        .expect_err("empty id must fail");
        assert!(matches!(err, ValidationError::Field { field: "id", .. }));
    }

    #[test]
    fn channel_message_becomes_channel_event() {
        let message: ChannelMessage = serde_json::from_value(json!({
            "id": "m1",
            "tenantId": "t1",
            "sessionId": "s1",
            "agentName": "concierge",
            "channel": "whatsapp",
            "direction": "inbound",
            "payload": {"text": "hi"},
            "timestamp": "2026-01-05T10:00:00Z",
        }))
        .unwrap();

        let event = message.into_event();
        assert_eq!(event.event_type, "channel.message");
        assert_eq!(event.source, "whatsapp");
        assert_eq!(event.channel.as_deref(), Some("whatsapp"));
        assert_eq!(event.resolved_agent(), Some("concierge"));
    }
}
