//! Synchronous agent dispatch route.

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use hub_primitives::{HubEvent, JsonMap};

use crate::app::AppState;
use crate::error::ApiError;

/// Body of `POST /agents/{agentName}/run`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRunRequest {
    /// Tenant on whose behalf the agent runs.
    pub tenant_id: String,
    /// Payload handed to the agent.
    #[serde(default)]
    pub payload: JsonMap,
    /// Session whose scratch is loaded and written back.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Channel label attached to the synthetic event.
    #[serde(default)]
    pub channel: Option<String>,
    /// Free-form metadata; `eventId` and `eventType` override the synthetic
    /// event's fields.
    #[serde(default)]
    pub metadata: JsonMap,
}

/// Dispatches one agent synchronously and returns its raw result.
pub async fn run_agent(
    State(state): State<AppState>,
    Path(agent_name): Path<String>,
    Json(request): Json<AgentRunRequest>,
) -> Result<Json<Value>, ApiError> {
    let Some(agent) = state
        .registry
        .get_agent(&agent_name, Some(&request.tenant_id))
        .await?
    else {
        return Err(ApiError::not_found(format!(
            "Agent {agent_name} not registered"
        )));
    };

    let event = HubEvent {
        id: request
            .metadata
            .get("eventId")
            .and_then(Value::as_str)
            .map_or_else(|| Uuid::new_v4().to_string(), ToOwned::to_owned),
        tenant_id: request.tenant_id.clone(),
        event_type: request
            .metadata
            .get("eventType")
            .and_then(Value::as_str)
            .unwrap_or("agent.direct")
            .to_owned(),
        source: "orchestrator".to_owned(),
        timestamp: Utc::now(),
        payload: request.payload.clone(),
        session_id: request.session_id.clone(),
        target_agent: None,
        agent_name: Some(agent_name.clone()),
        channel: request.channel.clone(),
        correlation_id: None,
        metadata: request.metadata.clone(),
    };

    let session_context = match &request.session_id {
        Some(session_id) => {
            state
                .tenants
                .get_session_state(&request.tenant_id, session_id)
                .await?
        }
        None => None,
    };

    let result = state
        .executor
        .execute(
            &agent,
            &request.tenant_id,
            &request.payload,
            &event,
            session_context,
            request.channel.as_deref(),
        )
        .await?;

    Ok(Json(json!({
        "status": "completed",
        "agent": agent_name,
        "result": result,
    })))
}
