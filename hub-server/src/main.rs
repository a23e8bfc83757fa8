//! Binary entry point: wiring and serve loop.

#![warn(clippy::pedantic)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hub_bus::{BrokerProducer, EventBus, LocalBroker};
use hub_dispatch::{AgentExecutor, HubRouter};
use hub_journey::{
    CaseManagerTool, CaseWorkflow, DocumentVaultTool, IntegrationConfig, JourneyService,
    TravelSearchTool, WorkflowTools,
};
use hub_registry::{RegistryCache, RegistryClient, RegistryConfig, TenantContextService};
use hub_store::{ContextStore, RedisBackend, StoreBackend};
use hub_telemetry::MetricsCollector;

use hub_server::app::{build_app, AppState};
use hub_server::config::HubConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = HubConfig::from_env();
    info!(service = %config.service_name, addr = %config.bind_addr, "starting hub server");

    let backend: Arc<dyn StoreBackend> =
        Arc::new(RedisBackend::new(&config.redis_url).context("invalid redis configuration")?);
    let store = ContextStore::new(backend, &config.hub_namespace);

    let producer = build_producer(&config);
    let bus = EventBus::new(producer, store.clone())
        .with_agent_topic_suffix(config.agent_topic_suffix.as_str())
        .with_hub_topic_suffix(config.hub_topic_suffix.as_str())
        .with_replay_stream_suffix(config.replay_stream.as_str());

    let mut registry_config = RegistryConfig::new(&config.registry_url);
    if let Some(key) = &config.registry_api_key {
        registry_config = registry_config.with_api_key(key.as_str());
    }
    let registry_client = Arc::new(
        RegistryClient::new(registry_config, Some(store.clone()))
            .context("invalid registry configuration")?,
    );
    let registry = Arc::new(RegistryCache::new(registry_client.clone()));
    let tenants = Arc::new(
        TenantContextService::new(store.clone(), registry_client)
            .with_default_ttl(Duration::from_secs(config.tenant_ttl_secs)),
    );

    let metrics = Arc::new(MetricsCollector::new().context("metric registration failed")?);
    let executor = Arc::new(AgentExecutor::new(
        registry.clone(),
        tenants.clone(),
        bus.clone(),
        metrics.clone(),
    ));
    let router = Arc::new(
        HubRouter::new(
            registry.clone(),
            store.clone(),
            metrics.clone(),
            executor.clone(),
            bus.clone(),
        )
        .with_persist_stream(config.replay_stream.as_str()),
    );

    let tools = WorkflowTools {
        case_manager: config.case_manager_url.as_deref().map(|url| {
            CaseManagerTool::new(IntegrationConfig::new(url)).with_metrics(metrics.clone())
        }),
        travel: config.travel_search_url.as_deref().map(|url| {
            TravelSearchTool::new(IntegrationConfig::new(url)).with_metrics(metrics.clone())
        }),
        documents: config.document_vault_url.as_deref().map(|url| {
            DocumentVaultTool::new(IntegrationConfig::new(url)).with_metrics(metrics.clone())
        }),
    };
    let journey = Arc::new(JourneyService::new(
        CaseWorkflow::new(store.clone(), bus.clone(), tools),
        store.clone(),
    ));

    if let Err(err) = registry.refresh(true).await {
        warn!(error = %err, "initial registry refresh failed; continuing with an empty cache");
    }

    let state = AppState {
        service_name: config.service_name.clone(),
        router,
        registry,
        tenants,
        executor,
        store,
        metrics,
        journey,
        replay_stream: config.replay_stream.clone(),
    };

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    axum::serve(listener, build_app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

#[cfg(feature = "kafka")]
fn build_producer(config: &HubConfig) -> Arc<dyn BrokerProducer> {
    if !config.kafka_brokers.is_empty() {
        match hub_bus::KafkaProducer::new(&config.kafka_brokers) {
            Ok(producer) => return Arc::new(producer),
            Err(err) => warn!(error = %err, "kafka producer unavailable; using in-process broker"),
        }
    }
    Arc::new(LocalBroker::new())
}

#[cfg(not(feature = "kafka"))]
fn build_producer(config: &HubConfig) -> Arc<dyn BrokerProducer> {
    if !config.kafka_brokers.is_empty() {
        warn!("kafka brokers configured but the kafka feature is disabled; using in-process broker");
    }
    Arc::new(LocalBroker::new())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
