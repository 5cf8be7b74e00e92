//! WebSocket event streaming: live snapshot, histogram, and cycle pushes.

use std::sync::Arc;

use axum::{
    extract::{ws::WebSocket, State, WebSocketUpgrade},
    response::Response,
};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::core::registry::{Event, Registry};

/// Wire shape of a pushed event; mirrors `Event` but base64-encodes byte
/// payloads for JSON transport.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum WireEvent {
    Snapshot { timestamp_ns: u64, image: String },
    Histogram { rows: Vec<String> },
    Cycles { cycles_ms: Vec<u64> },
}

impl From<Event> for WireEvent {
    fn from(e: Event) -> Self {
        match e {
            Event::Snapshot { timestamp_ns, image } => {
                WireEvent::Snapshot { timestamp_ns, image: super::base64_encode(&image) }
            }
            Event::Histogram { counts } => {
                WireEvent::Histogram { rows: counts.iter().map(|row| super::base64_encode(row)).collect() }
            }
            Event::Cycles { cycles } => WireEvent::Cycles { cycles_ms: cycles },
        }
    }
}

/// WebSocket upgrade handler
pub async fn events_handler(ws: WebSocketUpgrade, State(registry): State<Arc<Registry>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, registry))
}

/// Streams every pushed event for the active session to the client until it
/// disconnects or the broadcast channel lags.
async fn handle_socket(mut socket: WebSocket, registry: Arc<Registry>) {
    info!("new websocket client connected");
    let mut rx = registry.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(event) => {
                        let wire: WireEvent = event.into();
                        match serde_json::to_string(&wire) {
                            Ok(json) => {
                                if let Err(e) = socket.send(axum::extract::ws::Message::Text(json)).await {
                                    error!(error = %e, "failed to send event to client");
                                    break;
                                }
                            }
                            Err(e) => error!(error = %e, "failed to serialize event"),
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "event channel error");
                        break;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(msg)) => {
                        if msg.is_close() {
                            debug!("client closed connection");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "websocket error");
                        break;
                    }
                    None => {
                        debug!("websocket closed");
                        break;
                    }
                }
            }
        }
    }

    info!("websocket client disconnected");
}
