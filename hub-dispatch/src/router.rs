//! Event routing between ingest, agents, and the bus.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use hub_bus::EventBus;
use hub_primitives::{ChannelMessage, HubEvent, ValidationError};
use hub_registry::{RegistryCache, RegistryError};
use hub_store::{ContextStore, StoreError};
use hub_telemetry::MetricsCollector;

use crate::{AgentExecutor, DispatchError};

const DEFAULT_PERSIST_STREAM: &str = "hub:events";

/// Result alias for router operations.
pub type RouterResult<T> = Result<T, RouterError>;

/// Errors surfaced by the router to its callers.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The ingested payload did not validate into a hub event.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Registry lookup failed while resolving the target agent.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Agent dispatch failed; surfaced to the caller.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Replay persistence or session lookup failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of routing one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RouteOutcome {
    /// The event was dispatched synchronously to an agent.
    #[serde(rename_all = "camelCase")]
    Completed {
        /// Name of the agent that handled the event.
        agent: String,
        /// Raw agent result.
        result: Value,
    },
    /// The event was fanned out to the bus (and persisted when requested).
    #[serde(rename_all = "camelCase")]
    Queued {
        /// Id of the queued event.
        event_id: String,
    },
}

/// Coordinates routing of hub events between orchestrator and agents.
pub struct HubRouter {
    registry: Arc<RegistryCache>,
    store: ContextStore,
    metrics: Arc<MetricsCollector>,
    executor: Arc<AgentExecutor>,
    bus: EventBus,
    persist_stream: String,
}

impl HubRouter {
    /// Creates a router over the shared hub components.
    #[must_use]
    pub fn new(
        registry: Arc<RegistryCache>,
        store: ContextStore,
        metrics: Arc<MetricsCollector>,
        executor: Arc<AgentExecutor>,
        bus: EventBus,
    ) -> Self {
        Self {
            registry,
            store,
            metrics,
            executor,
            bus,
            persist_stream: DEFAULT_PERSIST_STREAM.to_owned(),
        }
    }

    /// Overrides the replay stream suffix.
    #[must_use]
    pub fn with_persist_stream(mut self, stream: impl Into<String>) -> Self {
        self.persist_stream = stream.into();
        self
    }

    /// Routes one event: dispatch when a registered agent is resolved,
    /// otherwise fan out to the bus, which persists the event for replay
    /// unless `persist` is false.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError`] on registry failure or dispatch failure;
    /// publish-sink failures are absorbed by the bus.
    pub async fn route_event(&self, event: HubEvent, persist: bool) -> RouterResult<RouteOutcome> {
        debug!(event_id = %event.id, tenant_id = %event.tenant_id, "routing event");

        let agent_name = event.resolved_agent().map(ToOwned::to_owned);
        if let Some(name) = &agent_name {
            match self
                .registry
                .get_agent(name, Some(&event.tenant_id))
                .await?
            {
                Some(agent) => return self.dispatch_agent(&agent, &event).await,
                None => {
                    warn!(agent = %name, "agent not registered; falling back to event bus");
                }
            }
        }

        if persist {
            self.bus.publish(&event).await;
        } else {
            self.bus.publish_transient(&event).await;
        }
        self.metrics.incr_request(
            &event.tenant_id,
            agent_name.as_deref().unwrap_or("orchestrator"),
            event.channel.as_deref().unwrap_or("system"),
            &event.event_type,
        );
        Ok(RouteOutcome::Queued { event_id: event.id })
    }

    /// Validates a raw REST payload and routes it.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Validation`] on a malformed payload, otherwise
    /// whatever [`Self::route_event`] returns.
    pub async fn handle_rest_payload(&self, payload: Value) -> RouterResult<RouteOutcome> {
        let event = HubEvent::from_value(payload)?;
        self.route_event(event, true).await
    }

    /// Converts a channel message into its hub event and routes it.
    ///
    /// # Errors
    ///
    /// See [`Self::route_event`].
    pub async fn handle_channel_message(
        &self,
        message: ChannelMessage,
    ) -> RouterResult<RouteOutcome> {
        self.route_event(message.into_event(), true).await
    }

    /// Replays the persisted event at or before `entry_id` on the tenant's
    /// replay stream, without re-persisting it.
    ///
    /// Returns `None` when no entry matches or the stored payload is not a
    /// valid event.
    ///
    /// # Errors
    ///
    /// See [`Self::route_event`].
    pub async fn replay_event(
        &self,
        tenant_id: &str,
        entry_id: &str,
    ) -> RouterResult<Option<RouteOutcome>> {
        let stream = format!("{tenant_id}:{}", self.persist_stream);
        let entries = self
            .store
            .read_stream_rev(&stream, Some(entry_id), 1)
            .await?;
        let Some(entry) = entries.first() else {
            return Ok(None);
        };
        let Some(raw) = entry.fields.get("data") else {
            return Ok(None);
        };

        let event = match serde_json::from_str::<Value>(raw)
            .map_err(|err| err.to_string())
            .and_then(|value| HubEvent::from_value(value).map_err(|err| err.to_string()))
        {
            Ok(event) => event,
            Err(reason) => {
                warn!(stream, entry_id, reason, "discarding unreplayable stream entry");
                return Ok(None);
            }
        };

        self.route_event(event, false).await.map(Some)
    }

    async fn dispatch_agent(
        &self,
        agent: &hub_primitives::AgentRecord,
        event: &HubEvent,
    ) -> RouterResult<RouteOutcome> {
        let session_context = match &event.session_id {
            Some(session_id) => {
                self.store
                    .get_session_context(&event.tenant_id, session_id)
                    .await?
            }
            None => None,
        };

        let result = self
            .executor
            .execute(
                agent,
                &event.tenant_id,
                &event.payload,
                event,
                session_context,
                event.channel.as_deref(),
            )
            .await?;

        debug!(
            event_id = %event.id,
            agent = %agent.name,
            tenant_id = %event.tenant_id,
            "dispatched event to agent"
        );
        Ok(RouteOutcome::Completed {
            agent: agent.name.clone(),
            result,
        })
    }
}
