//! Namespaced context facade over a raw backend.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::warn;

use crate::backend::{StoreBackend, StoreResult, StreamEntry};

const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60 * 24);
const DEFAULT_STREAM_MAX_LEN: usize = 1000;

/// Tenant- and session-scoped context storage.
///
/// Keys are namespaced as `{tenantId}:{ns}:context`,
/// `{tenantId}:{ns}:session:{sessionId}`, and `{ns}:{stream}` (stream names
/// already containing `:` are used verbatim). Values are JSON; reads that
/// fail to parse are logged and reported as absent.
#[derive(Clone)]
pub struct ContextStore {
    backend: Arc<dyn StoreBackend>,
    namespace: String,
    default_ttl: Duration,
}

impl ContextStore {
    /// Creates a store over the given backend and namespace.
    #[must_use]
    pub fn new(backend: Arc<dyn StoreBackend>, namespace: &str) -> Self {
        let namespace = namespace.trim_end_matches(':');
        Self {
            backend,
            namespace: if namespace.is_empty() {
                "hub".to_owned()
            } else {
                namespace.to_owned()
            },
            default_ttl: DEFAULT_TTL,
        }
    }

    /// Overrides the default TTL applied when callers do not supply one.
    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Returns the configured namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Reads the tenant context blob.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError`] on backend failure.
    pub async fn get_tenant_context(&self, tenant_id: &str) -> StoreResult<Option<Map<String, Value>>> {
        self.get_map(&self.tenant_key(tenant_id)).await
    }

    /// Writes the tenant context blob.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError`] on encode or backend failure.
    pub async fn set_tenant_context(
        &self,
        tenant_id: &str,
        context: &Map<String, Value>,
        ttl: Option<Duration>,
    ) -> StoreResult<()> {
        let payload = serde_json::to_string(context)?;
        self.backend
            .set(
                &self.tenant_key(tenant_id),
                payload,
                Some(ttl.unwrap_or(self.default_ttl)),
            )
            .await
    }

    /// Deletes the tenant context blob.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError`] on backend failure.
    pub async fn delete_tenant_context(&self, tenant_id: &str) -> StoreResult<()> {
        self.backend.delete(&self.tenant_key(tenant_id)).await
    }

    /// Reads the session scratch blob.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError`] on backend failure.
    pub async fn get_session_context(
        &self,
        tenant_id: &str,
        session_id: &str,
    ) -> StoreResult<Option<Map<String, Value>>> {
        self.get_map(&self.session_key(tenant_id, session_id)).await
    }

    /// Writes the session scratch blob.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError`] on encode or backend failure.
    pub async fn set_session_context(
        &self,
        tenant_id: &str,
        session_id: &str,
        context: &Map<String, Value>,
        ttl: Option<Duration>,
    ) -> StoreResult<()> {
        let payload = serde_json::to_string(context)?;
        self.backend
            .set(
                &self.session_key(tenant_id, session_id),
                payload,
                Some(ttl.unwrap_or(self.default_ttl)),
            )
            .await
    }

    /// Deletes the session scratch blob.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError`] on backend failure.
    pub async fn delete_session_context(&self, tenant_id: &str, session_id: &str) -> StoreResult<()> {
        self.backend
            .delete(&self.session_key(tenant_id, session_id))
            .await
    }

    /// Appends a JSON payload to a stream and returns the entry id.
    ///
    /// The stream is trimmed to roughly 1000 entries unless a different cap
    /// is supplied.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError`] on encode or backend failure.
    pub async fn append_stream(
        &self,
        stream: &str,
        payload: &Map<String, Value>,
        max_len: Option<usize>,
    ) -> StoreResult<String> {
        let data = serde_json::to_string(payload)?;
        self.backend
            .append_stream(
                &self.stream_key(stream),
                "data",
                data,
                Some(max_len.unwrap_or(DEFAULT_STREAM_MAX_LEN)),
            )
            .await
    }

    /// Reads up to `count` stream entries newest-first, starting at `max_id`
    /// inclusive (newest entry when `None`).
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError`] on backend failure.
    pub async fn read_stream_rev(
        &self,
        stream: &str,
        max_id: Option<&str>,
        count: usize,
    ) -> StoreResult<Vec<StreamEntry>> {
        self.backend
            .read_stream_rev(&self.stream_key(stream), max_id, count)
            .await
    }

    /// Reads an arbitrary JSON value by raw key.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError`] on backend failure.
    pub async fn get_json(&self, key: &str) -> StoreResult<Option<Value>> {
        let Some(raw) = self.backend.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                warn!(key, error = %err, "discarding unparseable store value");
                Ok(None)
            }
        }
    }

    /// Writes an arbitrary JSON value by raw key.
    ///
    /// Unlike the tenant and session helpers, no TTL is applied unless the
    /// caller asks for one; checkpoints written through this path persist.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError`] on encode or backend failure.
    pub async fn set_json(&self, key: &str, value: &Value, ttl: Option<Duration>) -> StoreResult<()> {
        let payload = serde_json::to_string(value)?;
        self.backend.set(key, payload, ttl).await
    }

    async fn get_map(&self, key: &str) -> StoreResult<Option<Map<String, Value>>> {
        match self.get_json(key).await? {
            Some(Value::Object(map)) => Ok(Some(map)),
            Some(_) => {
                warn!(key, "discarding non-object store value");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn tenant_key(&self, tenant_id: &str) -> String {
        format!("{tenant_id}:{}:context", self.namespace)
    }

    fn session_key(&self, tenant_id: &str, session_id: &str) -> String {
        format!("{tenant_id}:{}:session:{session_id}", self.namespace)
    }

    fn stream_key(&self, stream: &str) -> String {
        if stream.contains(':') {
            stream.to_owned()
        } else {
            format!("{}:{stream}", self.namespace)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use serde_json::json;

    fn store() -> ContextStore {
        ContextStore::new(Arc::new(MemoryBackend::new()), "hub")
    }

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn session_context_round_trips_under_namespaced_key() {
        let backend = Arc::new(MemoryBackend::new());
        let store = ContextStore::new(backend.clone(), "hub");

        store
            .set_session_context("t1", "s1", &map(json!({"n": 1})), None)
            .await
            .unwrap();

        let raw = backend.get("t1:hub:session:s1").await.unwrap();
        assert!(raw.is_some());

        let context = store.get_session_context("t1", "s1").await.unwrap().unwrap();
        assert_eq!(context.get("n").unwrap(), &json!(1));

        store.delete_session_context("t1", "s1").await.unwrap();
        assert!(store.get_session_context("t1", "s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn qualified_stream_names_are_used_verbatim() {
        let backend = Arc::new(MemoryBackend::new());
        let store = ContextStore::new(backend.clone(), "hub");

        store
            .append_stream("t1:hub:events", &map(json!({"id": "e1"})), None)
            .await
            .unwrap();
        store
            .append_stream("audit", &map(json!({"id": "e2"})), None)
            .await
            .unwrap();

        assert_eq!(
            backend
                .read_stream_rev("t1:hub:events", None, 10)
                .await
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            backend.read_stream_rev("hub:audit", None, 10).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn unparseable_values_read_as_absent() {
        let backend = Arc::new(MemoryBackend::new());
        let store = ContextStore::new(backend.clone(), "hub");

        backend
            .set("t1:hub:context", "{not json".to_owned(), None)
            .await
            .unwrap();
        assert!(store.get_tenant_context("t1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_namespace_falls_back_to_hub() {
        let store = ContextStore::new(Arc::new(MemoryBackend::new()), ":");
        assert_eq!(store.namespace(), "hub");
    }

    #[tokio::test]
    async fn raw_json_round_trip() {
        let store = store();
        store
            .set_json("system:hub:registry:tenants", &json!([{"id": "t1"}]), None)
            .await
            .unwrap();
        let value = store.get_json("system:hub:registry:tenants").await.unwrap();
        assert_eq!(value.unwrap()[0]["id"], "t1");
    }
}
