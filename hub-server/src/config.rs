//! Environment-driven configuration.

use std::env;
use std::net::SocketAddr;

/// Runtime configuration for the hub server, read from `HUB_*` environment
/// variables with local-development defaults.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Service name reported by `/health`.
    pub service_name: String,
    /// Listen address.
    pub bind_addr: SocketAddr,
    /// Redis connection URL for the context store.
    pub redis_url: String,
    /// Kafka bootstrap brokers; empty disables the broker sink.
    pub kafka_brokers: Vec<String>,
    /// Base URL of the registry service.
    pub registry_url: String,
    /// Optional bearer token for the registry service.
    pub registry_api_key: Option<String>,
    /// Context store namespace.
    pub hub_namespace: String,
    /// Topic suffix for `agent.*` events.
    pub agent_topic_suffix: String,
    /// Topic suffix for all other events.
    pub hub_topic_suffix: String,
    /// Replay stream suffix.
    pub replay_stream: String,
    /// TTL in seconds for tenant write-through and session scratch.
    pub tenant_ttl_secs: u64,
    /// Base URL of the case-management integration, if deployed.
    pub case_manager_url: Option<String>,
    /// Base URL of the travel search integration, if deployed.
    pub travel_search_url: Option<String>,
    /// Base URL of the document vault integration, if deployed.
    pub document_vault_url: Option<String>,
}

impl HubConfig {
    /// Reads the configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            service_name: env_or("HUB_SERVICE_NAME", "ai-hub-orchestrator"),
            bind_addr: env_or("HUB_BIND_ADDR", "0.0.0.0:8080")
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 8080))),
            redis_url: env_or("HUB_REDIS_URL", "redis://localhost:6379/1"),
            kafka_brokers: split_list(&env_or("HUB_KAFKA_BROKERS", "")),
            registry_url: env_or("HUB_REGISTRY_URL", "http://localhost:8200"),
            registry_api_key: env::var("HUB_REGISTRY_API_KEY").ok().filter(|v| !v.is_empty()),
            hub_namespace: env_or("HUB_NAMESPACE", "hub"),
            agent_topic_suffix: env_or("HUB_AGENT_TOPIC", "ai.agent.events"),
            hub_topic_suffix: env_or("HUB_TOPIC_SUFFIX", "hub.events"),
            replay_stream: env_or("HUB_REPLAY_STREAM", "hub:events"),
            tenant_ttl_secs: env_or("HUB_DEFAULT_TTL", "600").parse().unwrap_or(600),
            case_manager_url: env::var("HUB_CASE_MANAGER_URL").ok().filter(|v| !v.is_empty()),
            travel_search_url: env::var("HUB_TRAVEL_SEARCH_URL").ok().filter(|v| !v.is_empty()),
            document_vault_url: env::var("HUB_DOCUMENT_VAULT_URL").ok().filter(|v| !v.is_empty()),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_owned())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broker_list_splits_and_trims() {
        assert_eq!(
            split_list("kafka-1:9092, kafka-2:9092 ,"),
            vec!["kafka-1:9092".to_owned(), "kafka-2:9092".to_owned()]
        );
        assert!(split_list("").is_empty());
    }
}
