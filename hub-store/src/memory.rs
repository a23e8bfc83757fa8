//! In-process backend used by tests and single-node runs.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::backend::{parse_entry_id, StoreBackend, StoreResult, StreamEntry};

#[derive(Debug)]
struct ValueCell {
    value: String,
    expires_at: Option<Instant>,
}

/// Volatile [`StoreBackend`] holding values and streams in process memory.
///
/// TTLs are honoured lazily on read; streams are trimmed on append like
/// their Redis counterparts.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    values: RwLock<HashMap<String, ValueCell>>,
    streams: RwLock<HashMap<String, VecDeque<StreamEntry>>>,
    seq: AtomicU64,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_entry_id(&self) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_millis());
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("{millis}-{seq}")
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let expired = {
            let values = self.values.read().await;
            match values.get(key) {
                None => return Ok(None),
                Some(cell) => match cell.expires_at {
                    Some(deadline) if deadline <= Instant::now() => true,
                    _ => return Ok(Some(cell.value.clone())),
                },
            }
        };
        if expired {
            self.values.write().await.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> StoreResult<()> {
        let cell = ValueCell {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.values.write().await.insert(key.to_owned(), cell);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.values.write().await.remove(key);
        Ok(())
    }

    async fn append_stream(
        &self,
        key: &str,
        field: &str,
        value: String,
        max_len: Option<usize>,
    ) -> StoreResult<String> {
        let id = self.next_entry_id();
        let mut fields = HashMap::new();
        fields.insert(field.to_owned(), value);

        let mut streams = self.streams.write().await;
        let entries = streams.entry(key.to_owned()).or_default();
        entries.push_back(StreamEntry {
            id: id.clone(),
            fields,
        });
        if let Some(max_len) = max_len {
            while entries.len() > max_len {
                entries.pop_front();
            }
        }
        Ok(id)
    }

    async fn read_stream_rev(
        &self,
        key: &str,
        max_id: Option<&str>,
        count: usize,
    ) -> StoreResult<Vec<StreamEntry>> {
        let ceiling = max_id.and_then(parse_entry_id);
        let streams = self.streams.read().await;
        let Some(entries) = streams.get(key) else {
            return Ok(Vec::new());
        };

        let selected = entries
            .iter()
            .rev()
            .filter(|entry| match (ceiling, parse_entry_id(&entry.id)) {
                (Some(max), Some(id)) => id <= max,
                (Some(_), None) => false,
                (None, _) => true,
            })
            .take(count)
            .cloned()
            .collect();
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn honours_ttl_on_read() {
        let backend = MemoryBackend::new();
        backend
            .set("k", "v".to_owned(), Some(Duration::from_millis(10)))
            .await
            .unwrap();
        assert_eq!(backend.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(backend.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn trims_stream_to_max_len() {
        let backend = MemoryBackend::new();
        for n in 0..5 {
            backend
                .append_stream("s", "data", format!("{n}"), Some(3))
                .await
                .unwrap();
        }
        let entries = backend.read_stream_rev("s", None, 10).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].fields.get("data").unwrap(), "4");
        assert_eq!(entries[2].fields.get("data").unwrap(), "2");
    }

    #[tokio::test]
    async fn reads_at_or_before_max_id() {
        let backend = MemoryBackend::new();
        let first = backend
            .append_stream("s", "data", "a".to_owned(), None)
            .await
            .unwrap();
        backend
            .append_stream("s", "data", "b".to_owned(), None)
            .await
            .unwrap();

        let entries = backend
            .read_stream_rev("s", Some(&first), 5)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].fields.get("data").unwrap(), "a");
    }

    #[tokio::test]
    async fn unknown_stream_reads_empty() {
        let backend = MemoryBackend::new();
        assert!(backend
            .read_stream_rev("missing", None, 5)
            .await
            .unwrap()
            .is_empty());
    }
}
