//! Core schemas shared across the hub orchestrator.
//!
//! These are the typed surfaces of the system: everything else (agent
//! payloads, agent responses, session scratch) is carried as opaque JSON.

#![warn(missing_docs, clippy::pedantic)]

mod agent;
mod error;
mod event;
mod tenant;

pub use agent::{AgentCapability, AgentRecord};
pub use error::{ValidationError, ValidationResult};
pub use event::{ChannelMessage, Direction, HubEvent, JsonMap};
pub use tenant::TenantRecord;

/// Tenant scope used when a caller does not name one.
pub const SYSTEM_TENANT: &str = "system";
