//! REST API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use lumen_core::CapabilityRecord;
use lumen_discovery::NetworkEnvironment;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::state::AppState;

/// API error response
#[derive(Serialize)]
struct ApiError {
    error: String,
}

impl ApiError {
    fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

/// A bulb as presented by the API
#[derive(Debug, Serialize)]
pub struct DeviceView {
    pub id: Option<String>,
    pub host: Option<String>,
    pub model: Option<String>,
    pub name: Option<String>,
    pub fw_ver: Option<String>,
    pub capabilities: CapabilityRecord,
}

impl From<CapabilityRecord> for DeviceView {
    fn from(record: CapabilityRecord) -> Self {
        Self {
            id: record.id().map(str::to_string),
            host: record.host().ok(),
            model: record.model().map(str::to_string),
            name: record.name().map(str::to_string),
            fw_ver: record.fw_ver().map(str::to_string),
            capabilities: record,
        }
    }
}

/// List all known bulbs
pub async fn list_devices(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let devices: Vec<DeviceView> = state
        .scanner
        .known_devices()
        .into_iter()
        .map(DeviceView::from)
        .collect();
    Json(devices)
}

/// Look up the capabilities of a single host, searching if needed
pub async fn get_device(
    State(state): State<Arc<AppState>>,
    Path(host): Path<String>,
) -> impl IntoResponse {
    match state.scanner.get_capabilities(&host).await {
        Some(record) => Json(DeviceView::from(record)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiError::new(format!("No bulb answered at {}", host))),
        )
            .into_response(),
    }
}

/// Trigger a broadcast search
pub async fn trigger_scan(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    info!("Manual scan triggered");
    state.scanner.scan();
    Json(serde_json::json!({
        "status": "started",
        "listeners": state.scanner.active_sources().len(),
    }))
}

/// List network adapters and the sources discovery is bound to
pub async fn list_interfaces(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.network.adapters() {
        Ok(adapters) => Json(serde_json::json!({
            "adapters": adapters,
            "active_sources": state.scanner.active_sources(),
        }))
        .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to list network adapters");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError::new(format!("Failed to list adapters: {}", e))),
            )
                .into_response()
        }
    }
}

/// Get current configuration
pub async fn get_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.config.clone())
}
