//! Prometheus metrics for the hub.
//!
//! One collector instance owns its registry; nothing registers against the
//! process-global default, so tests and embedded uses never collide.

#![warn(missing_docs, clippy::pedantic)]

use std::future::Future;
use std::time::Instant;

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use thiserror::Error;

/// Result alias for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Errors surfaced while registering or encoding metrics.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Metric registration or collection failure.
    #[error("metrics registry error: {source}")]
    Registry {
        /// Underlying prometheus failure.
        #[from]
        source: prometheus::Error,
    },
}

/// Implemented by dispatch errors so failures can be counted by kind.
pub trait DispatchErrorKind {
    /// Returns a short, stable label for the failure class.
    fn error_kind(&self) -> &'static str;
}

/// Labels attached to one agent dispatch.
#[derive(Debug, Clone, Copy)]
pub struct DispatchLabels<'a> {
    /// Name of the dispatched agent.
    pub agent_name: &'a str,
    /// Tenant on whose behalf the dispatch runs.
    pub tenant_id: &'a str,
    /// Channel the triggering event arrived on, if any.
    pub channel: Option<&'a str>,
    /// Type of the triggering event.
    pub event_type: &'a str,
}

/// Central metrics handle shared across hub components.
pub struct MetricsCollector {
    registry: Registry,
    agent_latency_seconds: HistogramVec,
    tenant_request_count: IntCounterVec,
    agent_error_total: IntCounterVec,
    integration_latency_seconds: HistogramVec,
}

impl MetricsCollector {
    /// Creates a collector with its own registry.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError`] when a metric cannot be registered.
    pub fn new() -> TelemetryResult<Self> {
        let registry = Registry::new();

        let agent_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "agent_latency_seconds",
                "Latency distribution for agent executions",
            ),
            &["agent_name", "tenant_id", "event_type"],
        )?;
        let tenant_request_count = IntCounterVec::new(
            Opts::new(
                "tenant_request_count",
                "Count of orchestration requests per tenant and agent",
            ),
            &["tenant_id", "agent_name", "channel", "event_type"],
        )?;
        let agent_error_total = IntCounterVec::new(
            Opts::new(
                "agent_error_total",
                "Total agent execution errors by tenant",
            ),
            &["agent_name", "tenant_id", "event_type", "error_type"],
        )?;
        let integration_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "integration_latency_seconds",
                "Latency distribution for integration tool calls",
            ),
            &["provider", "status"],
        )?;

        registry.register(Box::new(agent_latency_seconds.clone()))?;
        registry.register(Box::new(tenant_request_count.clone()))?;
        registry.register(Box::new(agent_error_total.clone()))?;
        registry.register(Box::new(integration_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            agent_latency_seconds,
            tenant_request_count,
            agent_error_total,
            integration_latency_seconds,
        })
    }

    /// Runs a dispatch future under the standard metric set.
    ///
    /// Latency is observed on success and failure; the request counter moves
    /// only on success and the error counter only on failure.
    ///
    /// # Errors
    ///
    /// Re-raises whatever the wrapped future returned.
    pub async fn track_dispatch<T, E, F>(&self, labels: DispatchLabels<'_>, call: F) -> Result<T, E>
    where
        E: DispatchErrorKind,
        F: Future<Output = Result<T, E>>,
    {
        let channel = labels.channel.unwrap_or("system");
        let start = Instant::now();
        let outcome = call.await;
        let elapsed = start.elapsed().as_secs_f64();

        self.agent_latency_seconds
            .with_label_values(&[labels.agent_name, labels.tenant_id, labels.event_type])
            .observe(elapsed);

        match &outcome {
            Ok(_) => {
                self.tenant_request_count
                    .with_label_values(&[
                        labels.tenant_id,
                        labels.agent_name,
                        channel,
                        labels.event_type,
                    ])
                    .inc();
            }
            Err(err) => {
                self.agent_error_total
                    .with_label_values(&[
                        labels.agent_name,
                        labels.tenant_id,
                        labels.event_type,
                        err.error_kind(),
                    ])
                    .inc();
            }
        }

        outcome
    }

    /// Increments the request counter for a non-dispatch routing outcome.
    pub fn incr_request(&self, tenant_id: &str, agent_name: &str, channel: &str, event_type: &str) {
        self.tenant_request_count
            .with_label_values(&[tenant_id, agent_name, channel, event_type])
            .inc();
    }

    /// Observes one integration tool call.
    pub fn observe_integration(&self, provider: &str, status: &str, seconds: f64) {
        self.integration_latency_seconds
            .with_label_values(&[provider, status])
            .observe(seconds);
    }

    /// Returns the current request count for a label set (test support).
    #[must_use]
    pub fn request_count(
        &self,
        tenant_id: &str,
        agent_name: &str,
        channel: &str,
        event_type: &str,
    ) -> u64 {
        self.tenant_request_count
            .with_label_values(&[tenant_id, agent_name, channel, event_type])
            .get()
    }

    /// Returns the current error count for a label set (test support).
    #[must_use]
    pub fn error_count(
        &self,
        agent_name: &str,
        tenant_id: &str,
        event_type: &str,
        error_type: &str,
    ) -> u64 {
        self.agent_error_total
            .with_label_values(&[agent_name, tenant_id, event_type, error_type])
            .get()
    }

    /// Encodes the registry in the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError`] when encoding fails.
    pub fn encode(&self) -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct FailedCall;

    impl DispatchErrorKind for FailedCall {
        fn error_kind(&self) -> &'static str {
            "upstream_status"
        }
    }

    fn labels<'a>() -> DispatchLabels<'a> {
        DispatchLabels {
            agent_name: "greeter",
            tenant_id: "t1",
            channel: None,
            event_type: "note",
        }
    }

    #[tokio::test]
    async fn success_moves_request_counter() {
        let metrics = MetricsCollector::new().unwrap();
        let result: Result<u8, FailedCall> =
            metrics.track_dispatch(labels(), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);

        assert_eq!(metrics.request_count("t1", "greeter", "system", "note"), 1);
        assert_eq!(metrics.error_count("greeter", "t1", "note", "upstream_status"), 0);
    }

    #[tokio::test]
    async fn failure_moves_error_counter_only() {
        let metrics = MetricsCollector::new().unwrap();
        let result: Result<u8, FailedCall> = metrics
            .track_dispatch(labels(), async { Err(FailedCall) })
            .await;
        assert!(result.is_err());

        assert_eq!(metrics.request_count("t1", "greeter", "system", "note"), 0);
        assert_eq!(metrics.error_count("greeter", "t1", "note", "upstream_status"), 1);
    }

    #[tokio::test]
    async fn encodes_text_exposition() {
        let metrics = MetricsCollector::new().unwrap();
        metrics.incr_request("t1", "orchestrator", "system", "note");
        let text = metrics.encode().unwrap();
        assert!(text.contains("tenant_request_count"));
    }
}
