//! Live feed of finished webhook events over a WebSocket at `/ws`.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use serde_json::json;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/ws", get(subscribe))
}

async fn subscribe(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let feed = state.ws_broadcast.subscribe();
    ws.on_upgrade(move |socket| relay_events(socket, feed))
}

/// Push every broadcast event to the client until either side goes away.
async fn relay_events(mut socket: WebSocket, mut feed: broadcast::Receiver<String>) {
    let hello = json!({ "type": "connected", "message": "docsync live updates" });
    if socket.send(Message::Text(hello.to_string())).await.is_err() {
        return;
    }

    loop {
        let outgoing = tokio::select! {
            event = feed.recv() => match event {
                Ok(text) => Message::Text(text),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "live feed subscriber fell behind");
                    Message::Text(
                        json!({ "type": "warning", "message": format!("missed {skipped} events") })
                            .to_string(),
                    )
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Ping(data))) => Message::Pong(data),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => continue,
            },
        };

        if socket.send(outgoing).await.is_err() {
            break;
        }
    }

    debug!("live feed subscriber left");
}
