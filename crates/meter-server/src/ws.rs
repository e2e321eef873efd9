//! WebSocket broadcast surface (root spec §4.9): every 100 ms, while not
//! paused, the engine snapshot is pushed to every connected subscriber as
//! message `"data"`.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use tracing::debug;

use crate::state::AppState;

const BROADCAST_INTERVAL: Duration = Duration::from_millis(100);

pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let mut rx = state.broadcast.subscribe();
    loop {
        match rx.recv().await {
            Ok(message) => {
                if socket.send(Message::Text(message.to_string())).await.is_err() {
                    break;
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "websocket subscriber fell behind the broadcast ticker");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Spawns the realtime ticker: recomputes sliding-window rates and
/// broadcasts the resulting snapshot every [`BROADCAST_INTERVAL`].
pub fn spawn_ticker(manager: Arc<meter_stats::UserDataManager>, tx: tokio::sync::broadcast::Sender<Arc<str>>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(BROADCAST_INTERVAL);
        loop {
            ticker.tick().await;
            let now = meter_stats::manager::now_ms();
            manager.tick_realtime(now);
            if manager.is_paused() {
                continue;
            }
            let snapshot = manager.snapshot();
            let payload = serde_json::json!({ "type": "data", "data": snapshot });
            match serde_json::to_string(&payload) {
                Ok(text) => {
                    // No subscribers is not an error: the ticker keeps running regardless.
                    let _ = tx.send(Arc::from(text));
                }
                Err(err) => tracing::error!(%err, "failed to serialize websocket snapshot"),
            }
        }
    });
}
