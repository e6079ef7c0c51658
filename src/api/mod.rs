// HTTP surface: observer gateway and health

pub mod health;
pub mod websocket;

pub use health::{create_health_router, HealthResponse};
pub use websocket::{create_ws_router, ws_handler, GatewayState};

use axum::http::{HeaderValue, Method};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::warn;

/// Full application router: `/ws/assets` plus `/health`, behind CORS
pub fn create_router(state: Arc<GatewayState>, cors_origin: &str) -> Router {
    let broadcaster = Arc::clone(&state.broadcaster);
    let router = create_ws_router(state).merge(create_health_router(broadcaster));

    match cors_origin.parse::<HeaderValue>() {
        Ok(origin) => router.layer(
            CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([Method::GET])
                .allow_credentials(true),
        ),
        Err(_) => {
            warn!(cors_origin = %cors_origin, "Invalid CORS origin, CORS disabled");
            router
        }
    }
}
