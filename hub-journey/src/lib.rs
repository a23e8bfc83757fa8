//! Staged case-journey workflow.
//!
//! A case advances through an explicit stage table from intake to
//! completion, checkpointing durable state after every node and emitting
//! redacted stage events on the bus. Clinical red flags divert the case
//! into an approval gate that halts the run until an external decision
//! arrives.

#![warn(missing_docs, clippy::pedantic)]

mod redact;
mod service;
mod state;
mod tools;
mod workflow;

use thiserror::Error;

pub use redact::{redact_payload, redact_text, redact_value, REDACTION_TOKEN};
pub use service::{ApprovalDecision, ApprovalRequest, JourneyService, StartCaseRequest};
pub use state::{JourneyState, Stage, NON_DIAGNOSTIC_DISCLAIMER};
pub use tools::{
    CaseManagerTool, DocumentVaultTool, IntegrationClient, IntegrationConfig, ToolError,
    ToolResult, TravelSearchTool,
};
pub use workflow::{CaseWorkflow, WorkflowTools};

/// Result alias for journey operations.
pub type JourneyResult<T> = Result<T, JourneyError>;

/// Errors surfaced by the journey workflow.
#[derive(Debug, Error)]
pub enum JourneyError {
    /// Checkpoint storage failed; the current step is considered failed.
    #[error("checkpoint store failure: {source}")]
    Checkpoint {
        /// Underlying store failure.
        #[from]
        source: hub_store::StoreError,
    },

    /// Persisted case state could not be decoded.
    #[error("stored case state is invalid: {reason}")]
    CorruptState {
        /// Human-readable decode failure.
        reason: String,
    },
}
