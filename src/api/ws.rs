//! WebSocket observer endpoint
//!
//! Each observer gets a bounded outbound buffer registered with the
//! hub, a writer task draining that buffer into the socket, and a read
//! loop that only exists to detect disconnects: inbound frames are
//! keepalives, ignored beyond resetting the liveness deadline. Idle
//! observers exceeding the deadline are disconnected.

use crate::core::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::debug;

/// Upgrade an observer connection and attach it to the hub
pub async fn websocket_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (tx, mut rx) = mpsc::channel::<String>(state.config.realtime.observer_buffer);
    let Some(id) = state.hub.register(tx) else {
        // Shutdown in progress; drop the connection without registering.
        return;
    };

    let (mut sink, mut stream) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if sink.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    let idle_timeout = state.config.idle_timeout();
    loop {
        match timeout(idle_timeout, stream.next()).await {
            // Any inbound frame counts as liveness and resets the deadline
            Ok(Some(Ok(Message::Close(_)))) | Ok(Some(Err(_))) | Ok(None) => break,
            Ok(Some(Ok(_))) => continue,
            Err(_) => {
                debug!(observer = %id, "observer idle deadline exceeded");
                break;
            }
        }
    }

    state.hub.unregister(&id);
    writer.abort();
}
