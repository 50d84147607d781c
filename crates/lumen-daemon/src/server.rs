//! Web server setup and routing

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::api;
use crate::state::AppState;
use crate::ws;

/// Build the API router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/devices", get(api::list_devices))
        .route("/api/devices/{host}", get(api::get_device))
        .route("/api/scan", post(api::trigger_scan))
        .route("/api/interfaces", get(api::list_interfaces))
        .route("/api/config", get(api::get_config))
        // WebSocket for real-time updates
        .route("/ws", get(ws::websocket_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Start discovery and serve the API
pub async fn run(state: Arc<AppState>, bind: &str) -> Result<()> {
    // Bring listeners up in the background so the API is available at once
    let scanner = state.scanner.clone();
    tokio::spawn(async move {
        scanner.setup().await;
        info!(
            sources = ?scanner.active_sources(),
            "Discovery scanner ready"
        );
    });

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(address = %bind, protocol = "HTTP", "Starting web server");
    axum::serve(listener, app).await?;
    Ok(())
}
