//! WebSocket transport for debugger front ends.
//!
//! Each connection is one consumer. Text frames carry exactly one DAP
//! message.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{CloseFrame, Message, WebSocket, close_code},
    },
    response::IntoResponse,
    routing::get,
};
use dap_mux_core::ProtocolMessage;
use futures::{SinkExt, StreamExt};

use crate::hub::{ChannelSink, HubHandle};

/// WebSocket upgrade handler.
///
/// Use this as an Axum route handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<HubHandle>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, hub))
}

async fn health() -> &'static str {
    "ok"
}

async fn handle_socket(socket: WebSocket, hub: HubHandle) {
    let (mut sender, mut receiver) = socket.split();
    let (sink, mut rx) = ChannelSink::channel();

    let attachment = match hub.attach(Arc::new(sink)).await {
        Ok(attachment) => attachment,
        Err(e) => {
            tracing::warn!("Rejecting consumer: {e}");
            let _ = sender
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: e.to_string().into(),
                })))
                .await;
            return;
        }
    };
    tracing::info!(
        session_id = %attachment.session,
        primary = attachment.primary,
        "WebSocket consumer attached"
    );

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    tracing::error!("Failed to serialize message: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text.to_string(),
            Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s,
                Err(_) => continue,
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::error!("WebSocket error: {e}");
                break;
            }
        };

        let message: ProtocolMessage = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(session_id = %attachment.session, "Invalid consumer message: {e}");
                continue;
            }
        };

        if hub.consumer_message(attachment.session, message).is_err() {
            break;
        }
    }

    let _ = hub.detach(attachment.consumer);
    send_task.abort();
}

/// Create the consumer-facing router with `/ws` and `/health`.
///
/// # Example
/// ```ignore
/// let app = Router::new()
///     .merge(create_ws_router(hub));
/// ```
#[must_use]
pub fn create_ws_router(hub: HubHandle) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .with_state(hub)
}
