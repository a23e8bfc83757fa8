//! Raw storage backend trait.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend-level failure (connection, command, protocol).
    #[error("store backend error: {reason}")]
    Backend {
        /// Human-readable context provided by the backend.
        reason: String,
    },

    /// A payload could not be encoded before writing.
    #[error("failed to encode store payload: {source}")]
    Encode {
        /// Underlying serde failure.
        #[from]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Convenience helper to construct backend errors.
    #[must_use]
    pub fn backend(reason: impl Into<String>) -> Self {
        Self::Backend {
            reason: reason.into(),
        }
    }
}

/// One entry read back from an append stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    /// Backend-assigned entry id, orderable as `{millis}-{seq}`.
    pub id: String,
    /// Field map stored with the entry.
    pub fields: HashMap<String, String>,
}

/// Key-value plus append-stream storage.
///
/// Implementations must be safe to share across tasks; all operations are
/// suspension points.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Reads a value, `None` when absent or expired.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Writes a value with an optional TTL.
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> StoreResult<()>;

    /// Deletes a key; deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Appends a single-field entry to a stream, trimming it to roughly
    /// `max_len` entries, and returns the new entry id.
    async fn append_stream(
        &self,
        key: &str,
        field: &str,
        value: String,
        max_len: Option<usize>,
    ) -> StoreResult<String>;

    /// Reads up to `count` entries newest-first, starting at `max_id`
    /// inclusive (or the newest entry when `None`).
    async fn read_stream_rev(
        &self,
        key: &str,
        max_id: Option<&str>,
        count: usize,
    ) -> StoreResult<Vec<StreamEntry>>;
}

/// Parses a stream entry id into its orderable parts.
#[must_use]
pub(crate) fn parse_entry_id(id: &str) -> Option<(u128, u64)> {
    let (millis, seq) = id.split_once('-')?;
    Some((millis.parse().ok()?, seq.parse().ok()?))
}
