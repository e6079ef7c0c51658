use crate::auth::{extract_credential, AuthError, CredentialValidator, Identity};
use crate::broadcast::Broadcaster;
use crate::simulation::FleetSnapshot;
use crate::subscription::ConnectionSession;
use axum::{
    extract::{ws::WebSocketUpgrade, Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::get,
    Extension, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Query parameters for WebSocket upgrade
#[derive(Deserialize)]
struct WsQuery {
    token: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Shared state for the observer gateway
#[derive(Clone)]
pub struct GatewayState {
    pub broadcaster: Arc<Broadcaster>,
    pub validator: Arc<dyn CredentialValidator>,
    pub auth_enabled: bool,
    /// Latest fleet snapshot for initial sync; `None` on relay-only instances
    pub snapshots: Option<watch::Receiver<FleetSnapshot>>,
}

/// Handshake auth: resolve the credential to an [`Identity`] before upgrade.
///
/// Runs as a route layer ahead of the `WebSocketUpgrade` extractor so a
/// rejected handshake gets a plain 401 and never reaches the index.
async fn ws_auth(
    State(state): State<Arc<GatewayState>>,
    Query(params): Query<WsQuery>,
    mut req: Request,
    next: Next,
) -> Response {
    let identity = if state.auth_enabled {
        match authenticate(&state, req.headers(), params.token.as_deref()).await {
            Ok(identity) => identity,
            Err(e) => {
                warn!(error = %e, "Rejected WebSocket handshake");
                return (
                    StatusCode::UNAUTHORIZED,
                    Json(ErrorResponse {
                        error: e.to_string(),
                    }),
                )
                    .into_response();
            }
        }
    } else {
        Identity::anonymous()
    };

    req.extensions_mut().insert(identity);
    next.run(req).await
}

async fn authenticate(
    state: &GatewayState,
    headers: &HeaderMap,
    query_token: Option<&str>,
) -> Result<Identity, AuthError> {
    let credential = extract_credential(headers, query_token)?;
    state.validator.validate(&credential).await
}

/// GET /ws/assets - observer WebSocket upgrade (auth handled by ws_auth)
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
) -> Response {
    debug!(user = %identity.email, "WebSocket upgrade request received");
    ws.on_upgrade(move |socket| async move {
        let (session, outbound) = ConnectionSession::open(
            identity,
            Arc::clone(&state.broadcaster),
            state.snapshots.clone(),
        );
        info!(
            connection_id = %session.id(),
            connections = state.broadcaster.connection_count(),
            "WebSocket session started"
        );
        session.run(socket, outbound).await;
    })
}

/// Create the observer WebSocket router with handshake auth applied
pub fn create_ws_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/ws/assets", get(ws_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), ws_auth))
        .with_state(state)
}
