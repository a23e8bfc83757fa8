//! Registered agent schema.

use serde::{Deserialize, Serialize};

use crate::event::JsonMap;

/// Capability flag advertised by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCapability {
    /// Capability name.
    pub name: String,
    /// Optional human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional capability version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Snapshot of an agent registered with the hub.
///
/// Names are unique within a tenant scope; the `system` scope acts as the
/// global fallback during lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    /// Registry-assigned identifier.
    pub id: String,
    /// Agent name, unique within its tenant scope.
    pub name: String,
    /// Primary execution endpoint; the hub POSTs to `{endpoint}/run`.
    pub endpoint: String,
    /// Optional display name for UIs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Optional semantic version string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Optional owning team or contact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Capabilities advertised by the agent.
    #[serde(default)]
    pub capabilities: Vec<AgentCapability>,
    /// Channels the agent accepts messages from.
    #[serde(default)]
    pub supported_channels: Vec<String>,
    /// Tenants the agent is provisioned for.
    #[serde(default)]
    pub tenants: Vec<String>,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: JsonMap,
}
