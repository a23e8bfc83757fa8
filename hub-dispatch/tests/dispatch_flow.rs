//! End-to-end dispatch and routing flows against a loopback agent server.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;

use hub_bus::{EventBus, LocalBroker};
use hub_dispatch::{AgentExecutor, DispatchError, HubRouter, RouteOutcome, RouterError};
use hub_primitives::{AgentRecord, HubEvent, TenantRecord, SYSTEM_TENANT};
use hub_registry::{RegistryCache, RegistryDirectory, RegistryResult, TenantContextService};
use hub_store::{ContextStore, MemoryBackend};
use hub_telemetry::MetricsCollector;

#[derive(Debug, Clone)]
struct Recorded {
    path: String,
    tenant_header: String,
    agent_header: String,
    body: Value,
}

async fn spawn_agent_server(status: u16, reply: Value) -> (String, Arc<Mutex<Vec<Recorded>>>) {
    let recorded: Arc<Mutex<Vec<Recorded>>> = Arc::new(Mutex::new(Vec::new()));
    let service_recorded = recorded.clone();

    let make_svc = make_service_fn(move |_conn| {
        let recorded = service_recorded.clone();
        let reply = reply.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |request: Request<Body>| {
                let recorded = recorded.clone();
                let reply = reply.clone();
                async move {
                    let (parts, body) = request.into_parts();
                    let bytes = hyper::body::to_bytes(body).await.unwrap();
                    let header = |name: &str| {
                        parts
                            .headers
                            .get(name)
                            .and_then(|value| value.to_str().ok())
                            .unwrap_or_default()
                            .to_owned()
                    };
                    recorded.lock().await.push(Recorded {
                        path: parts.uri.path().to_owned(),
                        tenant_header: header("x-tenant-id"),
                        agent_header: header("x-agent-name"),
                        body: serde_json::from_slice(&bytes).unwrap_or(Value::Null),
                    });
                    Ok::<_, Infallible>(
                        Response::builder()
                            .status(StatusCode::from_u16(status).unwrap())
                            .header("content-type", "application/json")
                            .body(Body::from(reply.to_string()))
                            .unwrap(),
                    )
                }
            }))
        }
    });

    let server = Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(make_svc);
    let addr = server.local_addr();
    tokio::spawn(server);
    (format!("http://{addr}"), recorded)
}

struct StaticDirectory {
    agents: Vec<AgentRecord>,
    tenants: Vec<TenantRecord>,
}

#[async_trait]
impl RegistryDirectory for StaticDirectory {
    async fn list_agents(&self, tenant_id: Option<&str>) -> RegistryResult<Vec<AgentRecord>> {
        match tenant_id {
            Some(SYSTEM_TENANT) | None => Ok(self.agents.clone()),
            Some(_) => Ok(Vec::new()),
        }
    }

    async fn list_tenants(&self, _use_cache: bool) -> RegistryResult<Vec<TenantRecord>> {
        Ok(self.tenants.clone())
    }

    async fn get_agent(
        &self,
        name: &str,
        _tenant_id: Option<&str>,
    ) -> RegistryResult<Option<AgentRecord>> {
        Ok(self.agents.iter().find(|agent| agent.name == name).cloned())
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

struct Harness {
    router: HubRouter,
    store: ContextStore,
    broker: Arc<LocalBroker>,
    metrics: Arc<MetricsCollector>,
}

fn agent_record(name: &str, endpoint: &str) -> AgentRecord {
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

fn harness(agents: Vec<AgentRecord>) -> Harness {
    let directory = Arc::new(StaticDirectory {
        agents,
        tenants: vec![TenantRecord::bare("t1")],
    });
    let store = ContextStore::new(Arc::new(MemoryBackend::new()), "hub");
    let broker = Arc::new(LocalBroker::new());
    let bus = EventBus::new(broker.clone(), store.clone());
    let metrics = Arc::new(MetricsCollector::new().unwrap());
    let registry = Arc::new(RegistryCache::new(directory.clone()));
    let tenants = Arc::new(TenantContextService::new(store.clone(), directory));
    let executor = Arc::new(AgentExecutor::new(
        registry.clone(),
        tenants,
        bus.clone(),
        metrics.clone(),
    ));
    let router = HubRouter::new(registry, store.clone(), metrics.clone(), executor, bus);

    Harness {
        router,
        store,
        broker,
        metrics,
    }
}

fn event(value: Value) -> HubEvent {
    HubEvent::from_value(value).unwrap()
}

#[tokio::test]
async fn dispatch_success_persists_session_and_emits_response() {
    let (endpoint, recorded) = spawn_agent_server(200, json!({"session": {"n": 1}})).await;
    let harness = harness(vec![agent_record("greeter", &endpoint)]);

    let outcome = harness
        .router
        .route_event(
            event(json!({
                "id": "e1",
                "tenantId": "t1",
                "type": "agent.direct",
                "source": "orchestrator",
                "timestamp": "2026-01-05T10:00:00Z",
                "payload": {"hello": "world"},
                "sessionId": "s1",
                "agentName": "greeter",
            })),
            true,
        )
        .await
        .unwrap();

    match outcome {
        RouteOutcome::Completed { agent, result } => {
            assert_eq!(agent, "greeter");
            assert_eq!(result["session"]["n"], 1);
        }
        RouteOutcome::Queued { .. } => panic!("expected dispatch"),
    }

    let observed = recorded.lock().await;
    assert_eq!(observed.len(), 1);
    assert_eq!(observed[0].path, "/run");
    assert_eq!(observed[0].tenant_header, "t1");
    assert_eq!(observed[0].agent_header, "greeter");
    assert_eq!(observed[0].body["payload"]["hello"], "world");
    assert_eq!(observed[0].body["tenant"]["id"], "t1");
    assert_eq!(observed[0].body["channel"], "system");
    drop(observed);

    let session = harness
        .store
        .get_session_context("t1", "s1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.get("n").unwrap(), &json!(1));

    let responses = harness.broker.topic("tenant.t1.ai.agent.events").await;
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["type"], "agent.response");
    assert_eq!(responses[0]["correlationId"], "e1");

    assert_eq!(
        harness.metrics.request_count("t1", "greeter", "system", "agent.direct"),
        1
    );
}

#[tokio::test]
async fn dispatch_failure_surfaces_and_skips_side_effects() {
    let (endpoint, _) = spawn_agent_server(500, json!({"error": "boom"})).await;
    let harness = harness(vec![agent_record("greeter", &endpoint)]);

    let err = harness
        .router
        .route_event(
            event(json!({
                "id": "e2",
                "tenantId": "t1",
                "type": "note",
                "source": "api",
                "timestamp": "2026-01-05T10:00:00Z",
                "sessionId": "s1",
                "targetAgent": "greeter",
            })),
            true,
        )
        .await
        .expect_err("upstream failure must surface");

    assert!(matches!(
        err,
        RouterError::Dispatch(DispatchError::UpstreamStatus { status: 500, .. })
    ));

    assert!(harness
        .store
        .get_session_context("t1", "s1")
        .await
        .unwrap()
        .is_none());
    assert!(harness
        .broker
        .topic("tenant.t1.ai.agent.events")
        .await
        .is_empty());
    assert_eq!(
        harness.metrics.error_count("greeter", "t1", "note", "upstream_status"),
        1
    );
    assert_eq!(harness.metrics.request_count("t1", "greeter", "system", "note"), 0);
}

#[tokio::test]
async fn event_without_agent_queues_with_single_append() {
    let harness = harness(Vec::new());

    let payload = json!({
        "id": "e3",
        "tenantId": "t1",
        "type": "note",
        "source": "api",
        "timestamp": "2026-01-05T10:00:00Z",
        "payload": {"k": "v"},
    });
    let outcome = harness
        .router
        .handle_rest_payload(payload.clone())
        .await
        .unwrap();
    assert_eq!(
        outcome,
        RouteOutcome::Queued {
            event_id: "e3".to_owned()
        }
    );

    let entries = harness
        .store
        .read_stream_rev("t1:hub:events", None, 10)
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    let stored: Value = serde_json::from_str(entries[0].fields.get("data").unwrap()).unwrap();
    assert_eq!(stored, HubEvent::from_value(payload).unwrap().to_value());

    assert_eq!(
        harness.metrics.request_count("t1", "orchestrator", "system", "note"),
        1
    );
}

#[tokio::test]
async fn unknown_agent_falls_back_to_queue_with_agent_label() {
    let harness = harness(Vec::new());

    let outcome = harness
        .router
        .route_event(
            event(json!({
                "id": "e4",
                "tenantId": "t1",
                "type": "note",
                "source": "api",
                "timestamp": "2026-01-05T10:00:00Z",
                "agentName": "ghost",
            })),
            true,
        )
        .await
        .unwrap();
    assert!(matches!(outcome, RouteOutcome::Queued { .. }));
    assert_eq!(harness.metrics.request_count("t1", "ghost", "system", "note"), 1);
}

#[tokio::test]
async fn replay_routes_again_without_second_append() {
    let harness = harness(Vec::new());

    harness
        .router
        .handle_rest_payload(json!({
            "id": "e5",
            "tenantId": "t1",
            "type": "note",
            "source": "api",
            "timestamp": "2026-01-05T10:00:00Z",
        }))
        .await
        .unwrap();

    let entries = harness
        .store
        .read_stream_rev("t1:hub:events", None, 1)
        .await
        .unwrap();
    let entry_id = entries[0].id.clone();

    let replayed = harness
        .router
        .replay_event("t1", &entry_id)
        .await
        .unwrap()
        .expect("entry must replay");
    assert_eq!(
        replayed,
        RouteOutcome::Queued {
            event_id: "e5".to_owned()
        }
    );

    let after = harness
        .store
        .read_stream_rev("t1:hub:events", None, 10)
        .await
        .unwrap();
    assert_eq!(after.len(), 1);

    assert!(harness
        .router
        .replay_event("t1", "0-0")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn channel_message_routes_as_channel_event() {
    let harness = harness(Vec::new());

    let message: hub_primitives::ChannelMessage = serde_json::from_value(json!({
        "id": "m1",
        "tenantId": "t1",
        "channel": "whatsapp",
        "direction": "inbound",
        "payload": {"text": "hi"},
        "timestamp": "2026-01-05T10:00:00Z",
    }))
    .unwrap();

    harness.router.handle_channel_message(message).await.unwrap();

    let published = harness.broker.topic("tenant.t1.hub.events").await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0]["type"], "channel.message");
    assert_eq!(published[0]["source"], "whatsapp");
    assert_eq!(
        harness
            .metrics
            .request_count("t1", "orchestrator", "whatsapp", "channel.message"),
        1
    );
}

#[tokio::test]
async fn malformed_rest_payload_is_rejected() {
    let harness = harness(Vec::new());
    let err = harness
        .router
        .handle_rest_payload(json!({"id": "oops"}))
        .await
        .expect_err("must fail validation");
    assert!(matches!(err, RouterError::Validation(_)));
}
