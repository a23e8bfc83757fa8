//! TTL-refreshed in-process view of the registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use hub_primitives::{AgentRecord, TenantRecord, SYSTEM_TENANT};

use crate::{RegistryDirectory, RegistryResult};

const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct CacheInner {
    agents: HashMap<String, HashMap<String, AgentRecord>>,
    tenants: HashMap<String, TenantRecord>,
    last_refresh: Option<Instant>,
}

/// Cached hub metadata with active-client tracking.
///
/// The system scope is refreshed wholesale on the configured interval;
/// non-system scopes are fetched on first use and memoized. Refreshes are
/// single-flight behind a mutex while reads stay on the shared lock.
pub struct RegistryCache {
    directory: Arc<dyn RegistryDirectory>,
    refresh_interval: Duration,
    inner: RwLock<CacheInner>,
    clients: std::sync::RwLock<HashMap<String, HashMap<String, u64>>>,
    refresh_gate: Mutex<()>,
}

impl RegistryCache {
    /// Creates a cache over the given directory.
    #[must_use]
    pub fn new(directory: Arc<dyn RegistryDirectory>) -> Self {
        Self {
            directory,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            inner: RwLock::new(CacheInner::default()),
            clients: std::sync::RwLock::new(HashMap::new()),
            refresh_gate: Mutex::new(()),
        }
    }

    /// Overrides the refresh interval.
    #[must_use]
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Refreshes the system scope and the tenant map if the cache is stale.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RegistryError`] when the directory cannot be
    /// reached.
    pub async fn refresh(&self, force: bool) -> RegistryResult<()> {
        if !force && self.is_fresh().await {
            return Ok(());
        }

        let _gate = self.refresh_gate.lock().await;
        if !force && self.is_fresh().await {
            return Ok(());
        }

        debug!("refreshing hub registry cache");
        let agents = self.directory.list_agents(Some(SYSTEM_TENANT)).await?;
        let tenants = self.directory.list_tenants(true).await?;

        let mut inner = self.inner.write().await;
        inner.agents.insert(
            SYSTEM_TENANT.to_owned(),
            agents
                .into_iter()
                .map(|agent| (agent.name.clone(), agent))
                .collect(),
        );
        inner.tenants = tenants
            .into_iter()
            .map(|tenant| (tenant.id.clone(), tenant))
            .collect();
        inner.last_refresh = Some(Instant::now());
        Ok(())
    }

    async fn is_fresh(&self) -> bool {
        self.inner
            .read()
            .await
            .last_refresh
            .is_some_and(|at| at.elapsed() < self.refresh_interval)
    }

    /// Lists agents visible in the given tenant scope.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RegistryError`] when the directory cannot be
    /// reached.
    pub async fn list_agents(&self, tenant_id: Option<&str>) -> RegistryResult<Vec<AgentRecord>> {
        self.refresh(false).await?;
        let scope = self.ensure_scope(tenant_id.unwrap_or(SYSTEM_TENANT)).await?;
        Ok(scope.into_values().collect())
    }

    /// Looks up one agent; a tenant-scoped record beats the system-scoped
    /// record of the same name.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RegistryError`] when the directory cannot be
    /// reached.
    pub async fn get_agent(
        &self,
        name: &str,
        tenant_id: Option<&str>,
    ) -> RegistryResult<Option<AgentRecord>> {
        self.refresh(false).await?;
        let scope_name = tenant_id.unwrap_or(SYSTEM_TENANT);
        let scope = self.ensure_scope(scope_name).await?;
        if let Some(agent) = scope.get(name) {
            return Ok(Some(agent.clone()));
        }
        if scope_name != SYSTEM_TENANT {
            let fallback = self.ensure_scope(SYSTEM_TENANT).await?;
            return Ok(fallback.get(name).cloned());
        }
        Ok(None)
    }

    /// Lists all known tenants.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RegistryError`] when the directory cannot be
    /// reached.
    pub async fn list_tenants(&self) -> RegistryResult<Vec<TenantRecord>> {
        self.refresh(false).await?;
        Ok(self.inner.read().await.tenants.values().cloned().collect())
    }

    /// Looks up one tenant in the refreshed map.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RegistryError`] when the directory cannot be
    /// reached.
    pub async fn get_tenant(&self, tenant_id: &str) -> RegistryResult<Option<TenantRecord>> {
        self.refresh(false).await?;
        Ok(self.inner.read().await.tenants.get(tenant_id).cloned())
    }

    /// Registers an active client for a tenant.
    pub fn register_client(&self, tenant_id: &str, client_id: &str) {
        debug!(tenant_id, client_id, "registering hub client");
        let mut clients = self.clients.write().expect("client table poisoned");
        clients
            .entry(tenant_id.to_owned())
            .or_default()
            .insert(client_id.to_owned(), epoch_seconds());
    }

    /// Records a heartbeat; an unknown pair is registered instead.
    pub fn heartbeat_client(&self, tenant_id: &str, client_id: &str) {
        let mut clients = self.clients.write().expect("client table poisoned");
        match clients
            .get_mut(tenant_id)
            .and_then(|tenant| tenant.get_mut(client_id))
        {
            Some(beat) => *beat = epoch_seconds(),
            None => {
                clients
                    .entry(tenant_id.to_owned())
                    .or_default()
                    .insert(client_id.to_owned(), epoch_seconds());
            }
        }
    }

    /// Removes an active client; empty tenant rows are dropped.
    pub fn unregister_client(&self, tenant_id: &str, client_id: &str) {
        let mut clients = self.clients.write().expect("client table poisoned");
        if let Some(tenant) = clients.get_mut(tenant_id) {
            tenant.remove(client_id);
            if tenant.is_empty() {
                clients.remove(tenant_id);
            }
        }
    }

    /// Dumps the active-client table, optionally filtered by tenant.
    #[must_use]
    pub fn list_clients(&self, tenant_id: Option<&str>) -> HashMap<String, HashMap<String, u64>> {
        let clients = self.clients.read().expect("client table poisoned");
        match tenant_id {
            Some(tenant_id) => {
                let mut table = HashMap::new();
                table.insert(
                    tenant_id.to_owned(),
                    clients.get(tenant_id).cloned().unwrap_or_default(),
                );
                table
            }
            None => clients.clone(),
        }
    }

    /// Registers an agent with the directory and updates the system scope
    /// with the server echo.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RegistryError`] when the directory rejects the
    /// registration.
    pub async fn sync_agent(&self, agent: &AgentRecord) -> RegistryResult<AgentRecord> {
        debug!(agent = %agent.name, "syncing agent with registry");
        let saved = self
            .directory
            .register_agent(agent, Some(SYSTEM_TENANT))
            .await?;
        let mut inner = self.inner.write().await;
        inner
            .agents
            .entry(SYSTEM_TENANT.to_owned())
            .or_default()
            .insert(saved.name.clone(), saved.clone());
        Ok(saved)
    }

    /// Registers a tenant with the directory and updates the tenant map with
    /// the server echo.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RegistryError`] when the directory rejects the
    /// registration.
    pub async fn sync_tenant(&self, tenant: &TenantRecord) -> RegistryResult<TenantRecord> {
        debug!(tenant = %tenant.id, "syncing tenant with registry");
        let saved = self.directory.register_tenant(tenant).await?;
        let mut inner = self.inner.write().await;
        inner.tenants.insert(saved.id.clone(), saved.clone());
        Ok(saved)
    }

    async fn ensure_scope(&self, scope: &str) -> RegistryResult<HashMap<String, AgentRecord>> {
        {
            let inner = self.inner.read().await;
            if let Some(agents) = inner.agents.get(scope) {
                return Ok(agents.clone());
            }
        }

        let fetched = self.directory.list_agents(Some(scope)).await?;
        let mapping: HashMap<String, AgentRecord> = fetched
            .into_iter()
            .map(|agent| (agent.name.clone(), agent))
            .collect();
        let mut inner = self.inner.write().await;
        inner.agents.insert(scope.to_owned(), mapping.clone());
        Ok(mapping)
    }
}

fn epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::Map;

    use crate::RegistryError;

    fn agent(name: &str, endpoint: &str) -> AgentRecord {
        AgentRecord {
            id: format!("id-{name}"),
            name: name.to_owned(),
            endpoint: endpoint.to_owned(),
            display_name: None,
            version: None,
            owner: None,
            capabilities: Vec::new(),
            supported_channels: Vec::new(),
            tenants: Vec::new(),
            metadata: Map::new(),
        }
    }

    #[derive(Default)]
    struct MockDirectory {
        system_agents: Vec<AgentRecord>,
        tenant_agents: HashMap<String, Vec<AgentRecord>>,
        tenants: Vec<TenantRecord>,
        list_calls: AtomicUsize,
    }

    #[async_trait]
    impl RegistryDirectory for MockDirectory {
        async fn list_agents(&self, tenant_id: Option<&str>) -> RegistryResult<Vec<AgentRecord>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            match tenant_id {
                Some(SYSTEM_TENANT) | None => Ok(self.system_agents.clone()),
                Some(tenant) => Ok(self.tenant_agents.get(tenant).cloned().unwrap_or_default()),
            }
        }

        async fn list_tenants(&self, _use_cache: bool) -> RegistryResult<Vec<TenantRecord>> {
            Ok(self.tenants.clone())
        }

        async fn get_agent(
            &self,
            name: &str,
            tenant_id: Option<&str>,
        ) -> RegistryResult<Option<AgentRecord>> {
            Ok(self
                .list_agents(tenant_id)
                .await?
                .into_iter()
                .find(|agent| agent.name == name))
        }

        async fn get_tenant(
            &self,
            tenant_id: &str,
            _use_cache: bool,
        ) -> RegistryResult<Option<TenantRecord>> {
            Ok(self.tenants.iter().find(|t| t.id == tenant_id).cloned())
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

    #[tokio::test]
    async fn tenant_scope_beats_system_scope() {
        let mut directory = MockDirectory::default();
        directory.system_agents = vec![agent("greeter", "http://system.local")];
        directory
            .tenant_agents
            .insert("t1".to_owned(), vec![agent("greeter", "http://t1.local")]);

        let cache = RegistryCache::new(Arc::new(directory));
        let resolved = cache.get_agent("greeter", Some("t1")).await.unwrap().unwrap();
        assert_eq!(resolved.endpoint, "http://t1.local");
    }

    #[tokio::test]
    async fn missing_tenant_record_falls_back_to_system() {
        let mut directory = MockDirectory::default();
        directory.system_agents = vec![agent("greeter", "http://system.local")];

        let cache = RegistryCache::new(Arc::new(directory));
        let resolved = cache.get_agent("greeter", Some("t1")).await.unwrap().unwrap();
        assert_eq!(resolved.endpoint, "http://system.local");

        assert!(cache.get_agent("absent", Some("t1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn refresh_is_a_noop_within_interval() {
        let mut directory = MockDirectory::default();
        directory.system_agents = vec![agent("greeter", "http://system.local")];
        let directory = Arc::new(directory);

        let cache = RegistryCache::new(directory.clone());
        cache.list_agents(None).await.unwrap();
        let after_first = directory.list_calls.load(Ordering::SeqCst);
        cache.list_agents(None).await.unwrap();
        assert_eq!(directory.list_calls.load(Ordering::SeqCst), after_first);
    }

    #[tokio::test]
    async fn heartbeat_on_unknown_pair_registers_it() {
        let cache = RegistryCache::new(Arc::new(MockDirectory::default()));
        cache.heartbeat_client("t1", "c1");

        let table = cache.list_clients(None);
        assert!(table.get("t1").unwrap().contains_key("c1"));

        cache.unregister_client("t1", "c1");
        assert!(cache.list_clients(None).get("t1").is_none());
    }

    #[tokio::test]
    async fn sync_agent_updates_system_scope() {
        let cache = RegistryCache::new(Arc::new(MockDirectory::default()));
        cache.refresh(true).await.unwrap();
        cache.sync_agent(&agent("new", "http://new.local")).await.unwrap();

        let resolved = cache.get_agent("new", None).await.unwrap().unwrap();
        assert_eq!(resolved.endpoint, "http://new.local");
    }

    struct FailingDirectory;

    #[async_trait]
    impl RegistryDirectory for FailingDirectory {
        async fn list_agents(&self, _tenant_id: Option<&str>) -> RegistryResult<Vec<AgentRecord>> {
            Err(RegistryError::UpstreamStatus {
                status: 503,
                body: "unavailable".to_owned(),
            })
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
            Ok(None)
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

    #[tokio::test]
    async fn refresh_failures_propagate() {
        let cache = RegistryCache::new(Arc::new(FailingDirectory));
        let err = cache.refresh(true).await.expect_err("refresh must fail");
        assert!(matches!(err, RegistryError::UpstreamStatus { status: 503, .. }));
    }
}
