//! HTTP client for the external registry service.

use std::time::Duration;

use async_trait::async_trait;
use hyper::{Method, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

use hub_http::{build_client, send, HyperClient, JsonRequest};
use hub_primitives::{AgentRecord, TenantRecord, SYSTEM_TENANT};
use hub_store::ContextStore;

use crate::{RegistryDirectory, RegistryError, RegistryResult};

const TENANT_LIST_CACHE_KEY: &str = "system:hub:registry:tenants";
const TENANT_CACHE_TTL: Duration = Duration::from_secs(600);

/// Configuration for [`RegistryClient`].
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl RegistryConfig {
    /// Creates a configuration for the given base URL.
    #[must_use]
    pub fn new(base_url: impl AsRef<str>) -> Self {
        Self {
            base_url: base_url.as_ref().trim_end_matches('/').to_owned(),
            api_key: None,
            timeout: Duration::from_secs(10),
        }
    }

    /// Supplies a bearer token attached to every call.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Overrides the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Configuration`] when the base URL has no
    /// scheme.
    pub fn validate(&self) -> RegistryResult<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(RegistryError::Configuration {
                reason: "registry base URL must start with http:// or https://".to_owned(),
            });
        }
        Ok(())
    }
}

/// HTTP [`RegistryDirectory`] with store-backed tenant caching.
pub struct RegistryClient {
    client: HyperClient,
    config: RegistryConfig,
    store: Option<ContextStore>,
}

impl RegistryClient {
    /// Creates a client; tenant listings are cached through `store` when one
    /// is supplied.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Configuration`] for an invalid base URL.
    pub fn new(config: RegistryConfig, store: Option<ContextStore>) -> RegistryResult<Self> {
        config.validate()?;
        Ok(Self {
            client: build_client(),
            config,
            store,
        })
    }

    fn request(&self, method: Method, path: &str, tenant_id: Option<&str>) -> RegistryResult<JsonRequest> {
        let mut request = JsonRequest::new(method, format!("{}{path}", self.config.base_url))
            .header("x-tenant", tenant_id.unwrap_or(SYSTEM_TENANT))?;
        if let Some(key) = &self.config.api_key {
            request = request.header("authorization", &format!("Bearer {key}"))?;
        }
        Ok(request)
    }

    async fn fetch(&self, request: JsonRequest) -> RegistryResult<(StatusCode, Value)> {
        let (status, bytes) = send(&self.client, request, self.config.timeout).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok((status, Value::Null));
        }
        if !status.is_success() {
            return Err(RegistryError::UpstreamStatus {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        let value = serde_json::from_slice(&bytes).map_err(|err| RegistryError::Decode {
            reason: format!("{err}"),
        })?;
        Ok((status, value))
    }

    fn decode<T: serde::de::DeserializeOwned>(value: Value) -> RegistryResult<T> {
        serde_json::from_value(value).map_err(|err| RegistryError::Decode {
            reason: format!("{err}"),
        })
    }

    fn tenant_cache_key(tenant_id: &str) -> String {
        format!("{tenant_id}:hub:registry:tenant")
    }

    async fn read_cached_tenants(&self) -> Vec<TenantRecord> {
        let Some(store) = &self.store else {
            return Vec::new();
        };
        match store.get_json(TENANT_LIST_CACHE_KEY).await {
            Ok(Some(value)) => serde_json::from_value(value).unwrap_or_default(),
            Ok(None) => Vec::new(),
            Err(err) => {
                debug!(error = %err, "tenant list cache read failed");
                Vec::new()
            }
        }
    }

    async fn write_cached_tenants(&self, tenants: &[TenantRecord]) -> RegistryResult<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        store
            .set_json(TENANT_LIST_CACHE_KEY, &json!(tenants), Some(TENANT_CACHE_TTL))
            .await?;
        for tenant in tenants {
            self.write_cached_tenant(tenant).await?;
        }
        Ok(())
    }

    async fn read_cached_tenant(&self, tenant_id: &str) -> Option<TenantRecord> {
        let store = self.store.as_ref()?;
        match store.get_json(&Self::tenant_cache_key(tenant_id)).await {
            Ok(Some(value)) => serde_json::from_value(value).ok(),
            Ok(None) => None,
            Err(err) => {
                debug!(tenant_id, error = %err, "tenant cache read failed");
                None
            }
        }
    }

    async fn write_cached_tenant(&self, tenant: &TenantRecord) -> RegistryResult<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        store
            .set_json(
                &Self::tenant_cache_key(&tenant.id),
                &json!(tenant),
                Some(TENANT_CACHE_TTL),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl RegistryDirectory for RegistryClient {
    async fn list_agents(&self, tenant_id: Option<&str>) -> RegistryResult<Vec<AgentRecord>> {
        let request = self.request(Method::GET, "/agents", tenant_id)?;
        let (_, value) = self.fetch(request).await?;
        let agents: Vec<AgentRecord> = Self::decode(value)?;
        debug!(count = agents.len(), "fetched agents from registry");
        Ok(agents)
    }

    async fn list_tenants(&self, use_cache: bool) -> RegistryResult<Vec<TenantRecord>> {
        if use_cache {
            let cached = self.read_cached_tenants().await;
            if !cached.is_empty() {
                return Ok(cached);
            }
        }

        let request = self.request(Method::GET, "/tenants", Some(SYSTEM_TENANT))?;
        let (_, value) = self.fetch(request).await?;
        let tenants: Vec<TenantRecord> = Self::decode(value)?;
        self.write_cached_tenants(&tenants).await?;
        Ok(tenants)
    }

    async fn get_agent(
        &self,
        name: &str,
        tenant_id: Option<&str>,
    ) -> RegistryResult<Option<AgentRecord>> {
        let request = self.request(Method::GET, &format!("/agents/{name}"), tenant_id)?;
        let (status, value) = self.fetch(request).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(Self::decode(value)?))
    }

    async fn get_tenant(
        &self,
        tenant_id: &str,
        use_cache: bool,
    ) -> RegistryResult<Option<TenantRecord>> {
        if use_cache {
            if let Some(cached) = self.read_cached_tenant(tenant_id).await {
                return Ok(Some(cached));
            }
        }

        let request = self.request(Method::GET, &format!("/tenants/{tenant_id}"), Some(SYSTEM_TENANT))?;
        let (status, value) = self.fetch(request).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let tenant: TenantRecord = Self::decode(value)?;
        self.write_cached_tenant(&tenant).await?;
        Ok(Some(tenant))
    }

    async fn register_agent(
        &self,
        agent: &AgentRecord,
        tenant_id: Option<&str>,
    ) -> RegistryResult<AgentRecord> {
        let request = self
            .request(Method::POST, "/agents", tenant_id)?
            .json(&json!(agent))?;
        let (_, value) = self.fetch(request).await?;
        Self::decode(value)
    }

    async fn register_tenant(&self, tenant: &TenantRecord) -> RegistryResult<TenantRecord> {
        let request = self
            .request(Method::POST, "/tenants", Some(SYSTEM_TENANT))?
            .json(&json!(tenant))?;
        let (_, value) = self.fetch(request).await?;
        let saved: TenantRecord = Self::decode(value)?;
        self.write_cached_tenant(&saved).await?;
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_requires_scheme() {
        let err = RegistryConfig::new("registry.local")
            .validate()
            .expect_err("missing scheme should error");
        assert!(matches!(err, RegistryError::Configuration { .. }));
    }

    #[test]
    fn config_trims_trailing_slash() {
        let config = RegistryConfig::new("http://registry.local/");
        assert_eq!(config.base_url, "http://registry.local");
    }
}
