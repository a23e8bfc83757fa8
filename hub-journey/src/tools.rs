//! HTTP clients for the integration tools the workflow consumes.
//!
//! Each tool shares the same machinery: bounded retries with exponential
//! backoff, an 8 second deadline per attempt, and a per-tool circuit
//! breaker that fails fast for 30 seconds after consecutive failures.

use std::sync::Arc;
use std::time::{Duration, Instant};

use hyper::Method;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::warn;

use hub_http::{build_client, send, HyperClient, JsonRequest};
use hub_telemetry::MetricsCollector;

/// Result alias for integration tool calls.
pub type ToolResult<T> = Result<T, ToolError>;

/// Errors surfaced by integration tool calls.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The tool's circuit breaker is open; no HTTP call was attempted.
    #[error("{provider} circuit breaker is open")]
    CircuitOpen {
        /// Tool whose circuit is open.
        provider: &'static str,
    },

    /// The request could not be constructed.
    #[error("failed to build {provider} request: {reason}")]
    Request {
        /// Tool the request was built for.
        provider: &'static str,
        /// Human-readable reason.
        reason: String,
    },

    /// Transport-level failure or timeout.
    #[error("{provider} transport error: {reason}")]
    Transport {
        /// Tool the call targeted.
        provider: &'static str,
        /// Human-readable reason.
        reason: String,
    },

    /// The tool answered with a non-success status.
    #[error("{provider} returned {status}")]
    UpstreamStatus {
        /// Tool the call targeted.
        provider: &'static str,
        /// HTTP status code.
        status: u16,
    },

    /// The tool answered with an undecodable body.
    #[error("failed to decode {provider} response: {reason}")]
    Decode {
        /// Tool the call targeted.
        provider: &'static str,
        /// Human-readable decode failure.
        reason: String,
    },
}

/// Configuration shared by the integration clients.
#[derive(Debug, Clone)]
pub struct IntegrationConfig {
    base_url: String,
    timeout: Duration,
    retries: u32,
    backoff_base: Duration,
    cooldown: Duration,
}

impl IntegrationConfig {
    /// Creates a configuration for the given base URL.
    #[must_use]
    pub fn new(base_url: impl AsRef<str>) -> Self {
        Self {
            base_url: base_url.as_ref().trim_end_matches('/').to_owned(),
            timeout: Duration::from_secs(8),
            retries: 3,
            backoff_base: Duration::from_millis(300),
            cooldown: Duration::from_secs(30),
        }
    }

    /// Overrides the per-attempt timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overrides the attempt budget.
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries.max(1);
        self
    }

    /// Overrides the base backoff delay.
    #[must_use]
    pub fn with_backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    /// Overrides the circuit cooldown.
    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

#[derive(Debug, Default)]
struct Breaker {
    failures: u32,
    open_until: Option<Instant>,
}

enum RequestBody {
    Empty,
    Json(Value),
    Raw {
        bytes: Vec<u8>,
        content_type: String,
    },
}

/// Shared HTTP machinery behind every integration tool.
pub struct IntegrationClient {
    provider: &'static str,
    client: HyperClient,
    config: IntegrationConfig,
    breaker: Mutex<Breaker>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl IntegrationClient {
    /// Creates a client for the named provider.
    #[must_use]
    pub fn new(provider: &'static str, config: IntegrationConfig) -> Self {
        Self {
            provider,
            client: build_client(),
            config,
            breaker: Mutex::new(Breaker::default()),
            metrics: None,
        }
    }

    /// Attaches the metrics collector for integration latency observations.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns the provider name.
    #[must_use]
    pub const fn provider(&self) -> &'static str {
        self.provider
    }

    /// Sends a JSON request through the retry and circuit machinery.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] on circuit-open, exhausted retries, or an
    /// undecodable response.
    pub async fn request_json(
        &self,
        method: Method,
        path: &str,
        payload: Option<&Value>,
    ) -> ToolResult<Value> {
        let body = match payload {
            Some(value) => RequestBody::Json(value.clone()),
            None => RequestBody::Empty,
        };
        self.request(method, path, &body).await
    }

    /// Sends a raw-body request through the retry and circuit machinery.
    ///
    /// # Errors
    ///
    /// See [`Self::request_json`].
    pub async fn request_raw(
        &self,
        method: Method,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> ToolResult<Value> {
        let body = RequestBody::Raw {
            bytes,
            content_type: content_type.to_owned(),
        };
        self.request(method, path, &body).await
    }

    async fn request(&self, method: Method, path: &str, body: &RequestBody) -> ToolResult<Value> {
        self.check_circuit().await?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let started = Instant::now();
            match self.try_once(method.clone(), path, body).await {
                Ok((status, value)) => {
                    self.observe(&status.to_string(), started.elapsed());
                    self.reset_failures().await;
                    return Ok(value);
                }
                Err(err) => {
                    self.observe("error", started.elapsed());
                    self.record_failure().await;
                    if attempt >= self.config.retries {
                        warn!(
                            provider = self.provider,
                            attempt,
                            error = %err,
                            "integration call failed after final attempt"
                        );
                        return Err(err);
                    }
                    let backoff = self.config.backoff_base * 2_u32.pow(attempt - 1);
                    sleep(backoff).await;
                }
            }
        }
    }

    async fn try_once(
        &self,
        method: Method,
        path: &str,
        body: &RequestBody,
    ) -> ToolResult<(u16, Value)> {
        let uri = format!("{}{path}", self.config.base_url);
        let request = match body {
            RequestBody::Empty => JsonRequest::new(method, uri),
            RequestBody::Json(value) => {
                JsonRequest::new(method, uri)
                    .json(value)
                    .map_err(|err| ToolError::Request {
                        provider: self.provider,
                        reason: err.to_string(),
                    })?
            }
            RequestBody::Raw {
                bytes,
                content_type,
            } => JsonRequest::new(method, uri)
                .header("content-type", content_type)
                .map_err(|err| ToolError::Request {
                    provider: self.provider,
                    reason: err.to_string(),
                })?
                .bytes(bytes.clone()),
        };

        let (status, bytes) = send(&self.client, request, self.config.timeout)
            .await
            .map_err(|err| ToolError::Transport {
                provider: self.provider,
                reason: err.to_string(),
            })?;

        if !status.is_success() {
            return Err(ToolError::UpstreamStatus {
                provider: self.provider,
                status: status.as_u16(),
            });
        }

        if bytes.is_empty() {
            return Ok((status.as_u16(), json!({})));
        }
        let value = serde_json::from_slice(&bytes).map_err(|err| ToolError::Decode {
            provider: self.provider,
            reason: format!("{err}"),
        })?;
        Ok((status.as_u16(), value))
    }

    async fn check_circuit(&self) -> ToolResult<()> {
        let mut breaker = self.breaker.lock().await;
        if let Some(open_until) = breaker.open_until {
            if open_until > Instant::now() {
                return Err(ToolError::CircuitOpen {
                    provider: self.provider,
                });
            }
            breaker.open_until = None;
            breaker.failures = 0;
        }
        Ok(())
    }

    async fn record_failure(&self) {
        let mut breaker = self.breaker.lock().await;
        breaker.failures += 1;
        if breaker.failures >= self.config.retries {
            breaker.open_until = Some(Instant::now() + self.config.cooldown);
            warn!(
                provider = self.provider,
                cooldown_secs = self.config.cooldown.as_secs(),
                "integration circuit opened"
            );
        }
    }

    async fn reset_failures(&self) {
        let mut breaker = self.breaker.lock().await;
        breaker.failures = 0;
    }

    fn observe(&self, status: &str, elapsed: Duration) {
        if let Some(metrics) = &self.metrics {
            metrics.observe_integration(self.provider, status, elapsed.as_secs_f64());
        }
    }
}

/// Case-management client: opens the case record and attaches notes.
pub struct CaseManagerTool {
    inner: IntegrationClient,
}

impl CaseManagerTool {
    /// Creates the tool over the shared integration machinery.
    #[must_use]
    pub fn new(config: IntegrationConfig) -> Self {
        Self {
            inner: IntegrationClient::new("case-manager", config),
        }
    }

    /// Attaches the metrics collector.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.inner = self.inner.with_metrics(metrics);
        self
    }

    /// Starts the case record on the case-management side.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] when the call fails.
    pub async fn start_case(&self, case_id: &str, payload: &Value) -> ToolResult<Value> {
        self.inner
            .request_json(
                Method::POST,
                &format!("/cases/{case_id}/start-agent"),
                Some(payload),
            )
            .await
    }

    /// Attaches a free-text note to the case.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] when the call fails.
    pub async fn add_note(
        &self,
        case_id: &str,
        note: &str,
        author: Option<&str>,
    ) -> ToolResult<Value> {
        self.inner
            .request_json(
                Method::POST,
                &format!("/cases/{case_id}/notes"),
                Some(&json!({"note": note, "author": author})),
            )
            .await
    }
}

/// Flight and hotel search client.
pub struct TravelSearchTool {
    inner: IntegrationClient,
}

impl TravelSearchTool {
    /// Creates the tool over the shared integration machinery.
    #[must_use]
    pub fn new(config: IntegrationConfig) -> Self {
        Self {
            inner: IntegrationClient::new("travel-search", config),
        }
    }

    /// Attaches the metrics collector.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.inner = self.inner.with_metrics(metrics);
        self
    }

    /// Searches flight itineraries.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] when the call fails.
    pub async fn search_flights(&self, query: &Value) -> ToolResult<Value> {
        self.inner
            .request_json(Method::POST, "/travel/flights/search", Some(query))
            .await
    }

    /// Searches hotel options.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] when the call fails.
    pub async fn search_hotels(&self, query: &Value) -> ToolResult<Value> {
        self.inner
            .request_json(Method::POST, "/travel/hotels/search", Some(query))
            .await
    }
}

/// Document blob gateway: uploads artefacts and mints presigned links.
pub struct DocumentVaultTool {
    inner: IntegrationClient,
}

impl DocumentVaultTool {
    /// Creates the tool over the shared integration machinery.
    #[must_use]
    pub fn new(config: IntegrationConfig) -> Self {
        Self {
            inner: IntegrationClient::new("document-vault", config),
        }
    }

    /// Attaches the metrics collector.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.inner = self.inner.with_metrics(metrics);
        self
    }

    /// Uploads an artefact and returns its storage reference.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] when the call fails.
    pub async fn upload(&self, key: &str, data: Vec<u8>, content_type: &str) -> ToolResult<String> {
        let response = self
            .inner
            .request_raw(Method::PUT, &format!("/objects/{key}"), data, content_type)
            .await?;
        Ok(response
            .get("location")
            .and_then(Value::as_str)
            .map_or_else(|| format!("vault://{key}"), ToOwned::to_owned))
    }

    /// Generates a presigned download URL for an artefact.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] when the call fails or the response carries no
    /// URL.
    pub async fn presign(&self, key: &str, expires: Duration) -> ToolResult<String> {
        let response = self
            .inner
            .request_json(
                Method::POST,
                &format!("/objects/{key}/presign"),
                Some(&json!({"expiresIn": expires.as_secs()})),
            )
            .await?;
        response
            .get("url")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
            .ok_or(ToolError::Decode {
                provider: "document-vault",
                reason: "presign response carried no url".to_owned(),
            })
    }
}
