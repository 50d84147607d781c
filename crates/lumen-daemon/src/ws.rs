//! WebSocket handler for real-time discovery events

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::api::DeviceView;
use crate::state::AppState;

/// WebSocket message types
#[derive(Serialize)]
#[serde(tag = "type", content = "data")]
enum WsMessage {
    /// Sent for every known bulb when a client connects
    #[serde(rename = "device_known")]
    DeviceKnown(DeviceView),
    /// A bulb appeared or moved to a new address
    #[serde(rename = "device_discovered")]
    DeviceDiscovered(DeviceView),
    #[serde(rename = "pong")]
    Pong,
}

/// WebSocket upgrade handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut discovery_events = state.subscribe();

    info!("WebSocket client connected");

    for record in state.scanner.known_devices() {
        let msg = WsMessage::DeviceKnown(DeviceView::from(record));
        if let Ok(json) = serde_json::to_string(&msg) {
            if sender.send(Message::Text(json.into())).await.is_err() {
                return;
            }
        }
    }

    loop {
        tokio::select! {
            event = discovery_events.recv() => {
                match event {
                    Ok(descriptor) => {
                        let msg = WsMessage::DeviceDiscovered(DeviceView::from(descriptor.headers));
                        if let Ok(json) = serde_json::to_string(&msg) {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        debug!(skipped = n, "Discovery event channel lagged");
                    }
                    Err(RecvError::Closed) => {
                        debug!("Discovery event channel closed");
                        break;
                    }
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        if text.as_str() == "ping" {
                            let Ok(pong) = serde_json::to_string(&WsMessage::Pong) else {
                                continue;
                            };
                            if sender.send(Message::Text(pong.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("WebSocket client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::CapabilityRecord;

    #[test]
    fn test_message_format() {
        let record: CapabilityRecord = [("id", "0x1"), ("Location", "yeelight://10.0.0.5:55443")]
            .into_iter()
            .collect();
        let json = serde_json::to_value(WsMessage::DeviceDiscovered(DeviceView::from(record))).unwrap();
        assert_eq!(json["type"], "device_discovered");
        assert_eq!(json["data"]["host"], "10.0.0.5");

        let pong = serde_json::to_value(WsMessage::Pong).unwrap();
        assert_eq!(pong["type"], "pong");
    }
}
