//! HTTP server assembly.

use anyhow::Result;
use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::api::{self, ApiError};
use crate::config::Config;
use crate::metrics;
use crate::state::AppState;
use crate::store::MemoryStore;
use crate::ws;

/// Build the full router over shared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.transport.websocket_path, get(ws::ws_handler))
        .route("/health", get(health_handler))
        .merge(api::routes())
        .fallback(not_found)
        .with_state(state)
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let state = Arc::new(AppState::new(config, Arc::new(MemoryStore::new())));
    let websocket_path = state.config.transport.websocket_path.clone();
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;

    info!("Ember server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}{}", addr, websocket_path);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": state.hub.len(),
        "online_users": state.realtime.stats().online_users,
    }))
}

async fn not_found() -> ApiError {
    ApiError::NotFound("Route not found".to_string())
}
