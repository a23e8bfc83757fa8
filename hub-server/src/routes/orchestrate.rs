//! Case orchestration routes.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde_json::Value;

use hub_journey::{ApprovalRequest, StartCaseRequest};

use crate::app::{AppState, TenantScope};
use crate::error::ApiError;

/// Drives a case end-to-end; may halt at the approval gate.
pub async fn start_case(
    State(state): State<AppState>,
    Json(request): Json<StartCaseRequest>,
) -> Result<Json<Value>, ApiError> {
    let rendered = state.journey.start_case(request).await?;
    Ok(Json(rendered))
}

/// Fetches the rendered state of a case from its checkpoint.
pub async fn case_state(
    State(state): State<AppState>,
    Extension(TenantScope(tenant_id)): Extension<TenantScope>,
    Path(case_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match state.journey.get_state(&tenant_id, &case_id).await? {
        Some(rendered) => Ok(Json(rendered)),
        None => Err(ApiError::not_found("Case not found")),
    }
}

/// Applies an external approval decision to a halted case.
pub async fn resolve_approval(
    State(state): State<AppState>,
    Json(request): Json<ApprovalRequest>,
) -> Result<Json<Value>, ApiError> {
    match state.journey.resolve_approval(request).await? {
        Some(rendered) => Ok(Json(rendered)),
        None => Err(ApiError::not_found("Case context not found")),
    }
}
