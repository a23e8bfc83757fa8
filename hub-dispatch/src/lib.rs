//! Hub routing and execution plane.
//!
//! [`AgentExecutor`] performs the outbound `/run` call with tenant context
//! and telemetry; [`HubRouter`] decides whether an ingested event is
//! dispatched to an agent or fanned out to the bus and persisted for replay.

#![warn(missing_docs, clippy::pedantic)]

mod executor;
mod router;

use thiserror::Error;

use hub_telemetry::DispatchErrorKind;

pub use executor::AgentExecutor;
pub use router::{HubRouter, RouteOutcome, RouterError};

/// Result alias for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors surfaced while dispatching to an agent.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Registry lookup failed while re-resolving the agent.
    #[error("agent registry lookup failed: {source}")]
    Registry {
        /// Underlying registry failure.
        #[from]
        source: hub_registry::RegistryError,
    },

    /// The request could not be constructed.
    #[error("failed to build agent request: {reason}")]
    Request {
        /// Human-readable reason.
        reason: String,
    },

    /// Transport-level failure reaching the agent.
    #[error("agent transport error: {reason}")]
    Transport {
        /// Human-readable reason.
        reason: String,
    },

    /// The agent call exceeded its deadline.
    #[error("agent call timed out")]
    Timeout,

    /// The agent answered with a non-success status.
    #[error("agent returned {status}: {body}")]
    UpstreamStatus {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The agent answered with an undecodable body.
    #[error("failed to decode agent response: {reason}")]
    Decode {
        /// Human-readable decode failure.
        reason: String,
    },

    /// Session state could not be written back after a successful call.
    #[error("failed to persist session state: {source}")]
    SessionWrite {
        /// Underlying store failure.
        source: hub_store::StoreError,
    },
}

impl DispatchErrorKind for DispatchError {
    fn error_kind(&self) -> &'static str {
        match self {
            Self::Registry { .. } => "registry",
            Self::Request { .. } => "request",
            Self::Transport { .. } => "transport",
            Self::Timeout => "timeout",
            Self::UpstreamStatus { .. } => "upstream_status",
            Self::Decode { .. } => "decode",
            Self::SessionWrite { .. } => "session_write",
        }
    }
}

impl From<hub_http::HttpError> for DispatchError {
    fn from(err: hub_http::HttpError) -> Self {
        match err {
            hub_http::HttpError::Timeout(_) => Self::Timeout,
            hub_http::HttpError::InvalidUri { .. } | hub_http::HttpError::Build { .. } => {
                Self::Request {
                    reason: err.to_string(),
                }
            }
            hub_http::HttpError::Transport { reason } | hub_http::HttpError::Body { reason } => {
                Self::Transport { reason }
            }
        }
    }
}
