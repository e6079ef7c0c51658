use crate::broadcast::Broadcaster;
use axum::{extract::State, response::Json, routing::get, Router};
use serde::Serialize;
use std::sync::Arc;

/// Liveness report for load balancers
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub instance_id: String,
    /// Connections attached to this instance
    pub connections: usize,
    /// Local plus remote observers
    pub observers: usize,
}

/// GET /health
async fn health(State(broadcaster): State<Arc<Broadcaster>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        instance_id: broadcaster.instance_id().to_string(),
        connections: broadcaster.connection_count(),
        observers: broadcaster.observer_count(),
    })
}

pub fn create_health_router(broadcaster: Arc<Broadcaster>) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(broadcaster)
}
