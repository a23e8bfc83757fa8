//! Hub event and registry routes.

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::{AppState, TenantScope};
use crate::error::ApiError;

/// Ingests an event: route, dispatch or queue, persist for replay.
pub async fn publish_event(
    State(state): State<AppState>,
    Json(mut payload): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    if let Some(body) = payload.as_object_mut() {
        body.entry("timestamp")
            .or_insert_with(|| json!(Utc::now().to_rfc3339()));
    }
    let outcome = state.router.handle_rest_payload(payload).await?;
    Ok(Json(json!(outcome)))
}

/// Replays a persisted event by stream entry id.
pub async fn replay_event(
    State(state): State<AppState>,
    Extension(TenantScope(tenant_id)): Extension<TenantScope>,
    Path(event_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match state.router.replay_event(&tenant_id, &event_id).await? {
        Some(outcome) => Ok(Json(json!(outcome))),
        None => Err(ApiError::not_found("Event not found")),
    }
}

/// Lists agents visible in the caller's tenant scope.
pub async fn list_registry(
    State(state): State<AppState>,
    Extension(TenantScope(tenant_id)): Extension<TenantScope>,
) -> Result<Json<Value>, ApiError> {
    let agents = state.registry.list_agents(Some(&tenant_id)).await?;
    Ok(Json(json!(agents)))
}

/// Same as the registry listing, wrapped with the tenant id.
pub async fn list_agents(
    State(state): State<AppState>,
    Extension(TenantScope(tenant_id)): Extension<TenantScope>,
) -> Result<Json<Value>, ApiError> {
    let agents = state.registry.list_agents(Some(&tenant_id)).await?;
    Ok(Json(json!({"tenantId": tenant_id, "agents": agents})))
}

/// Lists all known tenants.
pub async fn list_tenants(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let tenants = state.registry.list_tenants().await?;
    Ok(Json(json!(tenants)))
}

/// Query parameters for the event listing.
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Maximum number of entries returned.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// Lists the newest persisted events for the caller's tenant.
pub async fn list_events(
    State(state): State<AppState>,
    Extension(TenantScope(tenant_id)): Extension<TenantScope>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Value>, ApiError> {
    let stream = format!("{tenant_id}:{}", state.replay_stream);
    let entries = state
        .store
        .read_stream_rev(&stream, None, query.limit)
        .await?;

    let events: Vec<Value> = entries
        .into_iter()
        .filter_map(|entry| {
            let raw = entry.fields.get("data")?;
            let payload: Value = serde_json::from_str(raw).ok()?;
            Some(json!({"id": entry.id, "payload": payload}))
        })
        .collect();
    Ok(Json(json!(events)))
}

/// Records a heartbeat for an active client.
pub async fn heartbeat_client(
    State(state): State<AppState>,
    Path((tenant_id, client_id)): Path<(String, String)>,
) -> Json<Value> {
    state.registry.heartbeat_client(&tenant_id, &client_id);
    Json(json!({"status": "ok"}))
}

/// Dumps the active-client table.
pub async fn list_clients(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.registry.list_clients(None)))
}
