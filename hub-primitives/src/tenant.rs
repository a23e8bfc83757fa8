//! Tenant schema.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::JsonMap;

/// Tenant registered with the hub directory.
///
/// The tenant id prefixes every stream, cache key, and broker topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantRecord {
    /// Tenant identifier.
    pub id: String,
    /// Optional platform role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Optional owning organization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Optional deployment environment label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    /// Environment variables injected into agent requests.
    #[serde(default)]
    pub env_vars: HashMap<String, String>,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: JsonMap,
    /// Registry creation timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Registry update timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl TenantRecord {
    /// Creates a bare tenant with only an identifier.
    #[must_use]
    pub fn bare(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: None,
            organization: None,
            name: None,
            environment: None,
            env_vars: HashMap::new(),
            metadata: JsonMap::new(),
            created_at: None,
            updated_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_camel_case_fields() {
        let tenant: TenantRecord = serde_json::from_value(json!({
            "id": "t1",
            "envVars": {"REGION": "eu-west-1"},
            "createdAt": "2026-01-05T10:00:00Z",
        }))
        .unwrap();

        assert_eq!(tenant.env_vars.get("REGION").unwrap(), "eu-west-1");
        assert!(tenant.created_at.is_some());
    }

    #[test]
    fn bare_tenant_has_empty_environment() {
        let tenant = TenantRecord::bare("t9");
        assert_eq!(tenant.id, "t9");
        assert!(tenant.env_vars.is_empty());
    }
}
