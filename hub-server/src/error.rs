//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use hub_dispatch::{DispatchError, RouterError};
use hub_journey::JourneyError;
use hub_registry::RegistryError;
use hub_store::StoreError;

/// Error rendered to REST callers as `{"detail": ...}` with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    /// Creates an error with an explicit status.
    #[must_use]
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    /// 404 with the given detail.
    #[must_use]
    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({"detail": self.detail}))).into_response()
    }
}

impl From<RouterError> for ApiError {
    fn from(err: RouterError) -> Self {
        match &err {
            RouterError::Validation(_) => Self::new(StatusCode::BAD_REQUEST, err.to_string()),
            RouterError::Dispatch(dispatch) => dispatch_status(dispatch, err.to_string()),
            RouterError::Registry(_) => Self::new(StatusCode::BAD_GATEWAY, err.to_string()),
            RouterError::Store(_) => Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        dispatch_status(&err, err.to_string())
    }
}

fn dispatch_status(err: &DispatchError, detail: String) -> ApiError {
    match err {
        DispatchError::UpstreamStatus { .. }
        | DispatchError::Transport { .. }
        | DispatchError::Timeout
        | DispatchError::Decode { .. }
        | DispatchError::Registry { .. } => ApiError::new(StatusCode::BAD_GATEWAY, detail),
        DispatchError::Request { .. } | DispatchError::SessionWrite { .. } => {
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, detail)
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

impl From<JourneyError> for ApiError {
    fn from(err: JourneyError) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}
