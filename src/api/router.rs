use axum::{
    extract::State,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use serde::Serialize;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use super::middleware::{logging_middleware, metrics_middleware};
use super::state::AppState;
use super::types::Json;
use super::{chat, health, ingest};
use crate::infrastructure::observability::create_metrics_router;

#[derive(Serialize)]
struct ServiceInfo {
    name: &'static str,
    version: &'static str,
    mode: &'static str,
    endpoints: Vec<&'static str>,
}

async fn service_info(State(state): State<AppState>) -> impl IntoResponse {
    let mut endpoints = vec![
        "POST /api/chat",
        "POST /api/ingest",
        "GET /api/ingest",
        "GET /api/ingest/{id}",
        "DELETE /api/documents/{id}",
        "GET /health",
        "GET /live",
        "GET /ready",
    ];
    if state.metrics.is_some() {
        endpoints.push("GET /metrics");
    }

    Json(ServiceInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        mode: if state.in_memory { "in_memory" } else { "azure" },
        endpoints,
    })
}

/// Create the full router with application state
pub fn create_router(state: AppState) -> Router {
    let metrics = state.metrics.clone();
    let metrics_path = state.config.metrics.path.clone();

    let mut router = Router::new()
        .route("/", get(service_info))
        // Probes
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        .route("/live", get(health::live_check))
        // Function surface
        .route("/api/chat", post(chat::chat))
        .route("/api/ingest", post(ingest::ingest).get(ingest::list_jobs))
        .route("/api/ingest/{id}", get(ingest::get_job))
        .route("/api/documents/{*id}", delete(ingest::delete_document))
        // Needs MatchedPath, so only on routed requests
        .route_layer(middleware::from_fn(metrics_middleware))
        .with_state(state);

    if let Some(metrics) = metrics {
        router = router.merge(create_metrics_router(metrics, &metrics_path));
    }

    router
        .layer(middleware::from_fn(logging_middleware))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}
