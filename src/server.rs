//! WebSocket server surface.
//!
//! One axum router: `/ws` upgrades to the client duplex channel and hands
//! the socket to a session; `/health` answers liveness probes. Everything
//! interesting happens in [`crate::session`]; this module only bridges
//! socket frames to the session's channels.

use crate::defaults;
use crate::error::Result;
use crate::protocol::ServerMessage;
use crate::session::{self, SessionDeps};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{any, get};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Build the application router.
pub fn router(deps: Arc<SessionDeps>) -> Router {
    Router::new()
        .route("/ws", any(ws_handler))
        .route("/health", get(health))
        .with_state(deps)
}

/// Bind and serve until the process is stopped.
pub async fn serve(bind: &str, deps: Arc<SessionDeps>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, router(deps)).await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn ws_handler(
    State(deps): State<Arc<SessionDeps>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, deps))
}

/// Bridge one upgraded socket to a session: binary frames become audio,
/// text frames become control messages, and outbound session frames are
/// written back as JSON text.
async fn handle_socket(socket: WebSocket, deps: Arc<SessionDeps>) {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(defaults::OUTBOUND_CHANNEL_CAPACITY);
    let (audio_tx, audio_rx) = mpsc::channel::<Vec<u8>>(defaults::AUDIO_CHANNEL_CAPACITY);
    let (ctl_tx, ctl_rx) = mpsc::channel::<String>(8);

    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let json = match message.to_json() {
                Ok(json) => json,
                Err(e) => {
                    warn!("failed to encode outbound frame: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let reader = tokio::spawn(async move {
        while let Some(message) = stream.next().await {
            // Bounded sends: a recognition backend that cannot keep up
            // backpressures this read loop (and so the client), instead
            // of buffering audio without limit.
            let delivered = match message {
                Ok(Message::Binary(data)) => audio_tx.send(data.to_vec()).await.is_ok(),
                Ok(Message::Text(text)) => ctl_tx.send(text.to_string()).await.is_ok(),
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => continue,
            };
            if !delivered {
                break;
            }
        }
        // Dropping both senders tells the session the client is gone.
    });

    if let Err(e) = session::run(deps, audio_rx, ctl_rx, out_tx).await {
        debug!("session ended: {}", e);
    }
    reader.abort();
    let _ = writer.await;
}
