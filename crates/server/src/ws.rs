// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket bridge.
//!
//! Clients send `{"type": "subscribe", "workspaceId": "..."}` and
//! receive every broadcast for that workspace as a JSON text frame;
//! `unsubscribe` stops the stream. A lagging client gets a structured
//! error frame instead of silently missing events.

use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use serde::Deserialize;
use tf_adapters::AgentSdk;
use tf_core::{BusEvent, WorkspaceId};
use tokio::sync::broadcast;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ClientCommand {
    Subscribe {
        #[serde(rename = "workspaceId")]
        workspace_id: WorkspaceId,
    },
    Unsubscribe,
}

pub async fn ws_handler<S: AgentSdk>(
    ws: WebSocketUpgrade,
    State(state): State<AppState<S>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket<S: AgentSdk>(mut socket: WebSocket, state: AppState<S>) {
    let mut subscription: Option<broadcast::Receiver<BusEvent>> = None;

    loop {
        tokio::select! {
            message = socket.recv() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientCommand>(&text) {
                            Ok(ClientCommand::Subscribe { workspace_id }) => {
                                debug!(workspace_id = %workspace_id, "ws subscribe");
                                subscription = Some(state.bus.subscribe(&workspace_id));
                            }
                            Ok(ClientCommand::Unsubscribe) => {
                                subscription = None;
                            }
                            Err(e) => {
                                let frame = serde_json::json!({
                                    "type": "error",
                                    "message": format!("invalid command: {}", e),
                                });
                                if send_json(&mut socket, &frame).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // binary frames ignored
                    Some(Err(e)) => {
                        debug!("ws recv error: {e}");
                        break;
                    }
                }
            }

            event = recv_event(&mut subscription) => {
                match event {
                    Ok(event) => {
                        if send_json(&mut socket, &event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("ws subscriber lagged by {n} events");
                        let frame = serde_json::json!({
                            "type": "error",
                            "message": format!("event stream lagged by {n} events"),
                        });
                        if send_json(&mut socket, &frame).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        subscription = None;
                    }
                }
            }
        }
    }
}

/// Await the next bus event, or park forever when unsubscribed.
async fn recv_event(
    subscription: &mut Option<broadcast::Receiver<BusEvent>>,
) -> Result<BusEvent, broadcast::error::RecvError> {
    match subscription {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn send_json<T: serde::Serialize>(
    socket: &mut WebSocket,
    value: &T,
) -> Result<(), axum::Error> {
    match serde_json::to_string(value) {
        Ok(json) => socket.send(Message::Text(json)).await,
        Err(e) => {
            warn!("ws serialization failed: {e}");
            Ok(())
        }
    }
}
