//! Outbound agent execution.

use std::sync::Arc;
use std::time::Duration;

use hyper::Method;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use hub_bus::EventBus;
use hub_http::{build_client, send, HyperClient, JsonRequest};
use hub_primitives::{AgentRecord, HubEvent, JsonMap};
use hub_registry::{RegistryCache, TenantContextService};
use hub_telemetry::{DispatchLabels, MetricsCollector};

use crate::{DispatchError, DispatchResult};

const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Executes agents over HTTP with tenant context and telemetry hooks.
pub struct AgentExecutor {
    client: HyperClient,
    registry: Arc<RegistryCache>,
    tenants: Arc<TenantContextService>,
    bus: EventBus,
    metrics: Arc<MetricsCollector>,
    timeout: Duration,
}

impl AgentExecutor {
    /// Creates an executor with its own pooled HTTP client.
    #[must_use]
    pub fn new(
        registry: Arc<RegistryCache>,
        tenants: Arc<TenantContextService>,
        bus: EventBus,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            client: build_client(),
            registry,
            tenants,
            bus,
            metrics,
            timeout: DEFAULT_AGENT_TIMEOUT,
        }
    }

    /// Overrides the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Dispatches one event to an agent and returns the raw agent result.
    ///
    /// The call is wrapped by the metrics collector: latency is always
    /// observed, the request counter moves on success, and the error counter
    /// records the concrete failure kind.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when the agent cannot be reached, answers
    /// with a non-success status, or the response cannot be consumed.
    pub async fn execute(
        &self,
        agent: &AgentRecord,
        tenant_id: &str,
        payload: &JsonMap,
        event: &HubEvent,
        session_context: Option<JsonMap>,
        channel: Option<&str>,
    ) -> DispatchResult<Value> {
        let labels = DispatchLabels {
            agent_name: &agent.name,
            tenant_id,
            channel: channel.or(event.channel.as_deref()),
            event_type: &event.event_type,
        };
        self.metrics
            .track_dispatch(
                labels,
                self.dispatch(agent, tenant_id, payload, event, session_context, channel),
            )
            .await
    }

    async fn dispatch(
        &self,
        agent: &AgentRecord,
        tenant_id: &str,
        payload: &JsonMap,
        event: &HubEvent,
        session_context: Option<JsonMap>,
        channel: Option<&str>,
    ) -> DispatchResult<Value> {
        let fresh = self.registry.get_agent(&agent.name, Some(tenant_id)).await?;
        let agent = fresh.as_ref().unwrap_or(agent);

        let tenant = match self.tenants.get_tenant(tenant_id, true).await {
            Ok(Some(tenant)) => Some(tenant),
            Ok(None) => {
                warn!(tenant_id, agent = %agent.name, "tenant not registered");
                None
            }
            Err(err) => {
                warn!(tenant_id, agent = %agent.name, error = %err, "tenant lookup failed");
                None
            }
        };

        let body = json!({
            "agent": {
                "id": &agent.id,
                "name": &agent.name,
                "capabilities": &agent.capabilities,
            },
            "tenant": tenant
                .map_or_else(|| json!({"id": tenant_id}), |tenant| json!(tenant)),
            "event": event.to_value(),
            "payload": payload,
            "session": session_context.unwrap_or_default(),
            "channel": channel.or(event.channel.as_deref()).unwrap_or("system"),
        });

        info!(
            tenant_id,
            agent = %agent.name,
            channel = channel.or(event.channel.as_deref()).unwrap_or("system"),
            "dispatching agent run"
        );

        let endpoint = format!("{}/run", agent.endpoint.trim_end_matches('/'));
        let request = JsonRequest::new(Method::POST, endpoint)
            .header("x-tenant-id", tenant_id)
            .map_err(|err| DispatchError::Request {
                reason: err.to_string(),
            })?
            .header("x-agent-name", &agent.name)
            .map_err(|err| DispatchError::Request {
                reason: err.to_string(),
            })?
            .json(&body)
            .map_err(|err| DispatchError::Request {
                reason: err.to_string(),
            })?;

        let (status, bytes) = send(&self.client, request, self.timeout).await?;
        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes).into_owned();
            error!(
                agent = %agent.name,
                tenant_id,
                event_type = %event.event_type,
                status = status.as_u16(),
                "agent call failed"
            );
            return Err(DispatchError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        let result: Value =
            serde_json::from_slice(&bytes).map_err(|err| DispatchError::Decode {
                reason: format!("{err}"),
            })?;

        self.persist_session_state(tenant_id, event, &result).await?;

        let correlation = event.correlation_id.as_deref().unwrap_or(&event.id);
        self.bus
            .emit_agent_response(tenant_id, &agent.name, &result, Some(correlation))
            .await;

        Ok(result)
    }

    async fn persist_session_state(
        &self,
        tenant_id: &str,
        event: &HubEvent,
        result: &Value,
    ) -> DispatchResult<()> {
        let Some(session_id) = &event.session_id else {
            return Ok(());
        };
        let Some(state) = result
            .get("session")
            .or_else(|| result.get("context"))
            .and_then(Value::as_object)
        else {
            return Ok(());
        };
        self.tenants
            .set_session_state(tenant_id, session_id, state, None)
            .await
            .map_err(|source| DispatchError::SessionWrite { source })
    }
}
