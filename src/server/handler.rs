//! HTTP API handler

use crate::config::ServerConfig;
use crate::relay::RelayCoordinator;
use crate::server::websocket::ws_upgrade;
use axum::{
    extract::State,
    http::{HeaderValue, Method},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Semaphore};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state for HTTP and WebSocket handlers
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<RelayCoordinator>,
    pub config: Arc<ServerConfig>,
    pub started_at: Instant,
    /// Flips to `true` when the server is stopping
    pub shutdown: watch::Receiver<bool>,
    /// One permit per WebSocket connection, taken before the upgrade
    pub connection_slots: Arc<Semaphore>,
}

impl AppState {
    pub fn new(
        coordinator: Arc<RelayCoordinator>,
        config: ServerConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let connection_slots = Arc::new(Semaphore::new(
            config.max_connections.min(Semaphore::MAX_PERMITS),
        ));
        Self {
            coordinator,
            config: Arc::new(config),
            started_at: Instant::now(),
            shutdown,
            connection_slots,
        }
    }
}

/// Create the relay router
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(get_status))
        .route("/sessions", get(list_sessions))
        .route("/ws", get(ws_upgrade))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS policy for the configured origins; `"*"` allows any origin.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Status response
#[derive(Debug, Serialize)]
struct StatusResponse {
    agent: String,
    session_count: usize,
    pending_count: usize,
    max_connections: usize,
    uptime_secs: u64,
}

/// Get relay status
async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.coordinator.sessions().active_sessions().await;
    let pending_count = sessions.iter().filter(|s| s.is_pending()).count();

    Json(StatusResponse {
        agent: state.coordinator.agent().name().to_string(),
        session_count: sessions.len(),
        pending_count,
        max_connections: state.config.max_connections,
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

/// Session info response
#[derive(Debug, Serialize)]
struct SessionInfo {
    id: String,
    connected: bool,
    pending: bool,
    created_at: i64,
    last_activity: i64,
    message_count: u64,
}

/// List live sessions
async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.coordinator.sessions().active_sessions().await;
    let infos: Vec<SessionInfo> = sessions
        .iter()
        .map(|session| SessionInfo {
            id: session.id.clone(),
            connected: session.is_connected(),
            pending: session.is_pending(),
            created_at: session.created_at,
            last_activity: session.last_activity(),
            message_count: session.message_count(),
        })
        .collect();

    Json(infos)
}
