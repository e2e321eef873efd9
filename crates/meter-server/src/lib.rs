//! Query/Broadcast Surface (C9 of the root spec): HTTP + WebSocket endpoints
//! over the statistics engine's snapshot view, plus settings endpoints.
//!
//! Port binding follows root spec §4.9: start at [`DEFAULT_PORT`]; on
//! address-in-use, increment and retry. On successful bind, best-effort
//! launch the OS default browser.

pub mod history;
pub mod response;
pub mod routes;
pub mod state;
pub mod ws;

use std::net::{Ipv4Addr, SocketAddr};

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use state::AppState;

pub const DEFAULT_PORT: u16 = 8989;
const MAX_PORT_ATTEMPTS: u16 = 100;

#[must_use]
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/data", get(routes::get_data))
        .route("/api/enemies", get(routes::get_enemies))
        .route("/api/clear", get(routes::get_clear))
        .route("/api/pause", get(routes::get_pause).post(routes::post_pause))
        .route("/api/skill/:uid", get(routes::get_skill))
        .route("/api/history/list", get(routes::get_history_list))
        .route("/api/history/:ts/summary", get(routes::get_history_summary))
        .route("/api/history/:ts/data", get(routes::get_history_data))
        .route("/api/history/:ts/skill/:uid", get(routes::get_history_skill))
        .route("/api/history/:ts/download", get(routes::get_history_download))
        .route("/api/settings", get(routes::get_settings).post(routes::post_settings))
        .route("/ws", get(ws::upgrade))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds the router starting at `start_port`, incrementing on
/// address-in-use until a free port is found; spawns the broadcast ticker;
/// launches the default browser (best-effort); then serves until the
/// process is asked to shut down.
pub async fn serve(state: AppState, start_port: u16) -> anyhow::Result<()> {
    let (listener, port) = bind_first_free_port(start_port).await?;

    let (tx, _rx) = tokio::sync::broadcast::channel(16);
    ws::spawn_ticker(state.manager.clone(), tx.clone());
    let state = AppState { broadcast: tx, ..state };

    let url = format!("http://127.0.0.1:{port}");
    info!(%url, "serving HTTP/WebSocket surface");
    if let Err(err) = webbrowser::open(&url) {
        warn!(%err, "failed to auto-launch browser");
    }

    let router = build_router(state);
    axum::serve(listener, router).await?;
    Ok(())
}

async fn bind_first_free_port(start_port: u16) -> anyhow::Result<(tokio::net::TcpListener, u16)> {
    let mut port = start_port;
    for _ in 0..MAX_PORT_ATTEMPTS {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => return Ok((listener, port)),
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                warn!(port, "port in use, retrying with next port");
                port += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }
    anyhow::bail!("no free port found in range {start_port}..{}", start_port + MAX_PORT_ATTEMPTS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_first_free_port_skips_an_occupied_port() {
        let held = tokio::net::TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0)).await.unwrap();
        let occupied_port = held.local_addr().unwrap().port();

        let (listener, port) = bind_first_free_port(occupied_port).await.unwrap();
        assert_ne!(port, occupied_port);
        assert_eq!(listener.local_addr().unwrap().port(), port);
    }
}
