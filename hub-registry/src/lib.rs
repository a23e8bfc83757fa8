//! Agent and tenant directory for the hub.
//!
//! [`RegistryClient`] talks to the external registry service over HTTP;
//! [`RegistryCache`] keeps a TTL-refreshed in-process view of it plus the
//! active-client heartbeat table; [`TenantContextService`] layers tenant
//! lookups across the process cache, the context store, and the registry.

#![warn(missing_docs, clippy::pedantic)]

mod cache;
mod client;
mod tenant;

use async_trait::async_trait;
use thiserror::Error;

use hub_primitives::{AgentRecord, TenantRecord};

pub use cache::RegistryCache;
pub use client::{RegistryClient, RegistryConfig};
pub use tenant::TenantContextService;

/// Result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors surfaced by registry lookups.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Registry configuration was invalid.
    #[error("invalid registry configuration: {reason}")]
    Configuration {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Transport-level failure reaching the registry service.
    #[error("registry transport error: {source}")]
    Transport {
        /// Underlying HTTP failure.
        #[from]
        source: hub_http::HttpError,
    },

    /// The registry answered with an unexpected status.
    #[error("registry returned {status}: {body}")]
    UpstreamStatus {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The registry answered with an undecodable body.
    #[error("failed to decode registry response: {reason}")]
    Decode {
        /// Human-readable decode failure.
        reason: String,
    },

    /// Context store failure while reading or writing cached records.
    #[error("registry store error: {source}")]
    Store {
        /// Underlying store failure.
        #[from]
        source: hub_store::StoreError,
    },
}

/// Directory of agents and tenants, as served by the registry service.
#[async_trait]
pub trait RegistryDirectory: Send + Sync {
    /// Lists agents visible in the given tenant scope.
    async fn list_agents(&self, tenant_id: Option<&str>) -> RegistryResult<Vec<AgentRecord>>;

    /// Lists all tenants, optionally bypassing the store-backed cache.
    async fn list_tenants(&self, use_cache: bool) -> RegistryResult<Vec<TenantRecord>>;

    /// Fetches one agent by name; `None` when the registry has no record.
    async fn get_agent(
        &self,
        name: &str,
        tenant_id: Option<&str>,
    ) -> RegistryResult<Option<AgentRecord>>;

    /// Fetches one tenant by id; `None` when the registry has no record.
    async fn get_tenant(
        &self,
        tenant_id: &str,
        use_cache: bool,
    ) -> RegistryResult<Option<TenantRecord>>;

    /// Registers (or upserts) an agent and returns the server echo.
    async fn register_agent(
        &self,
        agent: &AgentRecord,
        tenant_id: Option<&str>,
    ) -> RegistryResult<AgentRecord>;

    /// Registers (or upserts) a tenant and returns the server echo.
    async fn register_tenant(&self, tenant: &TenantRecord) -> RegistryResult<TenantRecord>;
}
