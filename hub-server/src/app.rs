//! Application state, middleware, and route registration.

use std::sync::Arc;

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use hub_dispatch::{AgentExecutor, HubRouter};
use hub_journey::JourneyService;
use hub_primitives::SYSTEM_TENANT;
use hub_registry::{RegistryCache, TenantContextService};
use hub_store::ContextStore;
use hub_telemetry::MetricsCollector;

use crate::routes;

/// Shared handles behind every route handler.
#[derive(Clone)]
pub struct AppState {
    /// Service name reported by `/health`.
    pub service_name: String,
    /// Event router.
    pub router: Arc<HubRouter>,
    /// Registry cache.
    pub registry: Arc<RegistryCache>,
    /// Tenant context service.
    pub tenants: Arc<TenantContextService>,
    /// Agent executor for direct runs.
    pub executor: Arc<AgentExecutor>,
    /// Context store.
    pub store: ContextStore,
    /// Metrics collector.
    pub metrics: Arc<MetricsCollector>,
    /// Journey service.
    pub journey: Arc<JourneyService>,
    /// Replay stream suffix.
    pub replay_stream: String,
}

/// Tenant scope resolved from the `X-Tenant` header.
#[derive(Debug, Clone)]
pub struct TenantScope(pub String);

async fn tenant_scope(mut request: Request, next: Next) -> Response {
    let tenant = request
        .headers()
        .get("x-tenant")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(SYSTEM_TENANT)
        .to_owned();
    request.extensions_mut().insert(TenantScope(tenant.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::try_from(tenant) {
        response.headers_mut().insert("x-tenant", value);
    }
    response
}

/// Builds the REST surface over the given state.
#[must_use]
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/metrics", get(routes::metrics))
        .route("/hub/events/publish", post(routes::hub::publish_event))
        .route("/hub/events/:event_id/replay", post(routes::hub::replay_event))
        .route("/hub/events", get(routes::hub::list_events))
        .route("/hub/registry", get(routes::hub::list_registry))
        .route("/hub/agents", get(routes::hub::list_agents))
        .route("/hub/tenants", get(routes::hub::list_tenants))
        .route(
            "/hub/clients/:tenant_id/:client_id/heartbeat",
            post(routes::hub::heartbeat_client),
        )
        .route("/hub/clients", get(routes::hub::list_clients))
        .route("/agents/:agent_name/run", post(routes::agents::run_agent))
        .route("/orchestrate/start", post(routes::orchestrate::start_case))
        .route("/orchestrate/state/:case_id", get(routes::orchestrate::case_state))
        .route("/orchestrate/approval", post(routes::orchestrate::resolve_approval))
        .layer(middleware::from_fn(tenant_scope))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
