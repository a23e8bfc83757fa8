//! Layered tenant context and session scratch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::warn;

use hub_primitives::TenantRecord;
use hub_store::{ContextStore, StoreResult};

use crate::{RegistryDirectory, RegistryResult};

const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);

/// Tenant lookups layered across process cache, context store, and registry,
/// plus per-session scratch storage.
pub struct TenantContextService {
    store: ContextStore,
    directory: Arc<dyn RegistryDirectory>,
    default_ttl: Duration,
    cache: RwLock<HashMap<String, TenantRecord>>,
    warm_gate: Mutex<()>,
}

impl TenantContextService {
    /// Creates the service over a context store and registry directory.
    #[must_use]
    pub fn new(store: ContextStore, directory: Arc<dyn RegistryDirectory>) -> Self {
        Self {
            store,
            directory,
            default_ttl: DEFAULT_SESSION_TTL,
            cache: RwLock::new(HashMap::new()),
            warm_gate: Mutex::new(()),
        }
    }

    /// Overrides the TTL used for write-through and session state.
    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Resolves a tenant, consulting process cache, then context store, then
    /// registry. Registry hits are written through to the store.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RegistryError`] on store or registry failure.
    pub async fn get_tenant(
        &self,
        tenant_id: &str,
        use_cache: bool,
    ) -> RegistryResult<Option<TenantRecord>> {
        if use_cache {
            if let Some(tenant) = self.cache.read().await.get(tenant_id) {
                return Ok(Some(tenant.clone()));
            }
        }

        if let Some(context) = self.store.get_tenant_context(tenant_id).await? {
            if let Some(raw) = context.get("tenant") {
                match serde_json::from_value::<TenantRecord>(raw.clone()) {
                    Ok(tenant) => {
                        if use_cache {
                            self.cache
                                .write()
                                .await
                                .insert(tenant_id.to_owned(), tenant.clone());
                        }
                        return Ok(Some(tenant));
                    }
                    Err(err) => {
                        warn!(tenant_id, error = %err, "discarding unparseable tenant context");
                    }
                }
            }
        }

        match self.directory.get_tenant(tenant_id, true).await? {
            Some(tenant) => {
                let mut context = Map::new();
                context.insert("tenant".to_owned(), json!(tenant));
                self.store
                    .set_tenant_context(tenant_id, &context, Some(self.default_ttl))
                    .await?;
                if use_cache {
                    self.cache
                        .write()
                        .await
                        .insert(tenant_id.to_owned(), tenant.clone());
                }
                Ok(Some(tenant))
            }
            None => {
                warn!(tenant_id, "tenant not found in registry");
                Ok(None)
            }
        }
    }

    /// Returns the tenant's environment variables, `{}` when unknown.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RegistryError`] on store or registry failure.
    pub async fn get_environment(&self, tenant_id: &str) -> RegistryResult<HashMap<String, String>> {
        Ok(self
            .get_tenant(tenant_id, true)
            .await?
            .map(|tenant| tenant.env_vars)
            .unwrap_or_default())
    }

    /// Writes session scratch for a tenant/session pair.
    ///
    /// # Errors
    ///
    /// Returns [`hub_store::StoreError`] on backend failure.
    pub async fn set_session_state(
        &self,
        tenant_id: &str,
        session_id: &str,
        state: &Map<String, Value>,
        ttl: Option<Duration>,
    ) -> StoreResult<()> {
        self.store
            .set_session_context(
                tenant_id,
                session_id,
                state,
                Some(ttl.unwrap_or(self.default_ttl)),
            )
            .await
    }

    /// Reads session scratch for a tenant/session pair.
    ///
    /// # Errors
    ///
    /// Returns [`hub_store::StoreError`] on backend failure.
    pub async fn get_session_state(
        &self,
        tenant_id: &str,
        session_id: &str,
    ) -> StoreResult<Option<Map<String, Value>>> {
        self.store.get_session_context(tenant_id, session_id).await
    }

    /// Clears session scratch for a tenant/session pair.
    ///
    /// # Errors
    ///
    /// Returns [`hub_store::StoreError`] on backend failure.
    pub async fn clear_session_state(&self, tenant_id: &str, session_id: &str) -> StoreResult<()> {
        self.store.delete_session_context(tenant_id, session_id).await
    }

    /// Force-refreshes one tenant into the process cache; warms are
    /// single-flight.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RegistryError`] on store or registry failure.
    pub async fn warm_tenant(&self, tenant_id: &str) -> RegistryResult<Option<TenantRecord>> {
        let _gate = self.warm_gate.lock().await;
        let tenant = self.get_tenant(tenant_id, false).await?;
        if let Some(tenant) = &tenant {
            self.cache
                .write()
                .await
                .insert(tenant_id.to_owned(), tenant.clone());
        }
        Ok(tenant)
    }

    /// Drops one tenant from the process cache, or all of them.
    pub async fn discard_cache(&self, tenant_id: Option<&str>) {
        let mut cache = self.cache.write().await;
        match tenant_id {
            Some(tenant_id) => {
                cache.remove(tenant_id);
            }
            None => cache.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use hub_primitives::AgentRecord;
    use hub_store::MemoryBackend;

    struct CountingDirectory {
        tenant: Option<TenantRecord>,
        tenant_calls: AtomicUsize,
    }

    #[async_trait]
    impl RegistryDirectory for CountingDirectory {
        async fn list_agents(&self, _tenant_id: Option<&str>) -> RegistryResult<Vec<AgentRecord>> {
            Ok(Vec::new())
        }

        async fn list_tenants(&self, _use_cache: bool) -> RegistryResult<Vec<TenantRecord>> {
            Ok(Vec::new())
        }

        async fn get_agent(
            &self,
            _name: &str,
            _tenant_id: Option<&str>,
        ) -> RegistryResult<Option<AgentRecord>> {
            Ok(None)
        }

        async fn get_tenant(
            &self,
            _tenant_id: &str,
            _use_cache: bool,
        ) -> RegistryResult<Option<TenantRecord>> {
            self.tenant_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.tenant.clone())
        }

        async fn register_agent(
            &self,
            agent: &AgentRecord,
            _tenant_id: Option<&str>,
        ) -> RegistryResult<AgentRecord> {
            Ok(agent.clone())
        }

        async fn register_tenant(&self, tenant: &TenantRecord) -> RegistryResult<TenantRecord> {
            Ok(tenant.clone())
        }
    }

    fn service(tenant: Option<TenantRecord>) -> (TenantContextService, Arc<CountingDirectory>, ContextStore) {
        let store = ContextStore::new(Arc::new(MemoryBackend::new()), "hub");
        let directory = Arc::new(CountingDirectory {
            tenant,
            tenant_calls: AtomicUsize::new(0),
        });
        (
            TenantContextService::new(store.clone(), directory.clone()),
            directory,
            store,
        )
    }

    #[tokio::test]
    async fn registry_hit_writes_through_to_store_and_cache() {
        let mut tenant = TenantRecord::bare("t1");
        tenant.env_vars.insert("REGION".to_owned(), "eu".to_owned());
        let (service, directory, store) = service(Some(tenant));

        let resolved = service.get_tenant("t1", true).await.unwrap().unwrap();
        assert_eq!(resolved.id, "t1");
        assert_eq!(directory.tenant_calls.load(Ordering::SeqCst), 1);

        let context = store.get_tenant_context("t1").await.unwrap().unwrap();
        assert_eq!(context.get("tenant").unwrap()["id"], "t1");

        // Second read comes from the process cache.
        service.get_tenant("t1", true).await.unwrap().unwrap();
        assert_eq!(directory.tenant_calls.load(Ordering::SeqCst), 1);

        let env = service.get_environment("t1").await.unwrap();
        assert_eq!(env.get("REGION").unwrap(), "eu");
    }

    #[tokio::test]
    async fn store_layer_shields_registry() {
        let (service, directory, store) = service(None);
        let mut context = Map::new();
        context.insert("tenant".to_owned(), json!({"id": "t2"}));
        store.set_tenant_context("t2", &context, None).await.unwrap();

        let resolved = service.get_tenant("t2", true).await.unwrap().unwrap();
        assert_eq!(resolved.id, "t2");
        assert_eq!(directory.tenant_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_everywhere_reads_empty() {
        let (service, _, _) = service(None);
        assert!(service.get_tenant("nope", true).await.unwrap().is_none());
        assert!(service.get_environment("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn warm_then_get_skips_registry() {
        let (service, directory, _) = service(Some(TenantRecord::bare("t3")));

        service.warm_tenant("t3").await.unwrap().unwrap();
        let calls_after_warm = directory.tenant_calls.load(Ordering::SeqCst);

        service.get_tenant("t3", true).await.unwrap().unwrap();
        assert_eq!(directory.tenant_calls.load(Ordering::SeqCst), calls_after_warm);
    }

    #[tokio::test]
    async fn discard_cache_forces_next_lookup_to_lower_layers() {
        let (service, directory, store) = service(Some(TenantRecord::bare("t4")));
        service.get_tenant("t4", true).await.unwrap();
        service.discard_cache(Some("t4")).await;

        // Store still holds the write-through copy, so the registry is not
        // consulted again.
        service.get_tenant("t4", true).await.unwrap().unwrap();
        assert_eq!(directory.tenant_calls.load(Ordering::SeqCst), 1);
        assert!(store.get_tenant_context("t4").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn session_state_round_trip() {
        let (service, _, _) = service(None);
        let mut state = Map::new();
        state.insert("n".to_owned(), json!(1));

        service.set_session_state("t1", "s1", &state, None).await.unwrap();
        let read = service.get_session_state("t1", "s1").await.unwrap().unwrap();
        assert_eq!(read.get("n").unwrap(), &json!(1));

        service.clear_session_state("t1", "s1").await.unwrap();
        assert!(service.get_session_state("t1", "s1").await.unwrap().is_none());
    }
}
