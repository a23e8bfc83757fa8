//! Redis-backed store used in shared deployments.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::debug;

use crate::backend::{StoreBackend, StoreError, StoreResult, StreamEntry};

/// [`StoreBackend`] over a shared Redis instance.
///
/// The connection is established lazily and exactly once; concurrent first
/// calls wait on the same connect.
pub struct RedisBackend {
    client: redis::Client,
    connection: Mutex<Option<ConnectionManager>>,
}

impl RedisBackend {
    /// Creates a backend for the given connection URL.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] when the URL cannot be parsed.
    pub fn new(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|err| StoreError::backend(format!("invalid redis url: {err}")))?;
        Ok(Self {
            client,
            connection: Mutex::new(None),
        })
    }

    async fn connection(&self) -> StoreResult<ConnectionManager> {
        let mut guard = self.connection.lock().await;
        if let Some(connection) = guard.as_ref() {
            return Ok(connection.clone());
        }
        let connection = ConnectionManager::new(self.client.clone())
            .await
            .map_err(|err| StoreError::backend(format!("redis connect failed: {err}")))?;
        debug!("context store connected to redis");
        *guard = Some(connection.clone());
        Ok(connection)
    }
}

fn command_error(err: redis::RedisError) -> StoreError {
    StoreError::backend(format!("redis command failed: {err}"))
}

#[async_trait]
impl StoreBackend for RedisBackend {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut connection = self.connection().await?;
        connection.get(key).await.map_err(command_error)
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> StoreResult<()> {
        let mut connection = self.connection().await?;
        let mut command = redis::cmd("SET");
        command.arg(key).arg(value);
        if let Some(ttl) = ttl {
            command.arg("EX").arg(ttl.as_secs().max(1));
        }
        command
            .query_async::<_, ()>(&mut connection)
            .await
            .map_err(command_error)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut connection = self.connection().await?;
        connection.del::<_, ()>(key).await.map_err(command_error)
    }

    async fn append_stream(
        &self,
        key: &str,
        field: &str,
        value: String,
        max_len: Option<usize>,
    ) -> StoreResult<String> {
        let mut connection = self.connection().await?;
        let mut command = redis::cmd("XADD");
        command.arg(key);
        if let Some(max_len) = max_len {
            command.arg("MAXLEN").arg("~").arg(max_len);
        }
        command.arg("*").arg(field).arg(value);
        command
            .query_async::<_, String>(&mut connection)
            .await
            .map_err(command_error)
    }

    async fn read_stream_rev(
        &self,
        key: &str,
        max_id: Option<&str>,
        count: usize,
    ) -> StoreResult<Vec<StreamEntry>> {
        let mut connection = self.connection().await?;
        let entries: Vec<(String, HashMap<String, String>)> = redis::cmd("XREVRANGE")
            .arg(key)
            .arg(max_id.unwrap_or("+"))
            .arg("-")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut connection)
            .await
            .map_err(command_error)?;

        Ok(entries
            .into_iter()
            .map(|(id, fields)| StreamEntry { id, fields })
            .collect())
    }
}
