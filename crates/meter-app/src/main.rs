//! Lifecycle & Control (C10 of the root spec): parses CLI arguments, loads
//! settings and the user cache, selects a capture device, wires the
//! ingestion pipeline into the statistics engine, serves the HTTP/WebSocket
//! surface, and flushes state synchronously on SIGINT/SIGTERM.

mod cli;
mod device;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use meter_net::capture::{self, RawFrame};
use meter_net::pipeline::{Pipeline, PipelineEvent};
use meter_proto::{ApplicationFrame, FrameDecoder, NullDecoder};
use meter_stats::manager::now_ms;
use meter_stats::UserDataManager;
use meter_server::state::AppState;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.env_filter_directive()));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let devices = device::list_devices()?;
    let device = device::resolve(&devices, cli.device.as_deref())?;
    info!(device = %device.name, "selected capture device");

    let logs_dir = PathBuf::from("./logs");
    let users_cache_path = PathBuf::from("./users.json");
    let settings_path = PathBuf::from("./settings.json");
    let start_time = now_ms();

    let manager = UserDataManager::load(logs_dir.clone(), users_cache_path, settings_path.clone(), start_time)?;

    let raw_frames = match capture::open(&device.name, capture::DEFAULT_BPF_FILTER) {
        Ok(rx) => rx,
        Err(err) => {
            error!(%err, "failed to open capture device");
            std::process::exit(1);
        }
    };

    let processing = tokio::spawn(run_processing(raw_frames, manager.clone()));

    let auto_save_manager = manager.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(10));
        loop {
            ticker.tick().await;
            auto_save_manager.tick_auto_save(now_ms());
        }
    });

    let state = AppState {
        manager: manager.clone(),
        settings_path,
        logs_dir,
        broadcast: tokio::sync::broadcast::channel(1).0,
    };
    let server = tokio::spawn(async move {
        if let Err(err) = meter_server::serve(state, meter_server::DEFAULT_PORT).await {
            error!(%err, "http/websocket surface exited");
        }
    });

    shutdown_signal().await;
    info!("shutdown signal received, flushing state");
    manager.shutdown(now_ms());
    processing.abort();
    server.abort();
    Ok(())
}

/// The processing task (root spec §5): drains the capture queue, runs
/// C2-C6 per frame via [`Pipeline`], hands complete frames to the (absent)
/// event decoder, and notifies the statistics engine of flow changes.
/// An oversized frame length is catastrophic stream corruption (root spec
/// §4.6/§7): log and terminate the process.
async fn run_processing(mut raw_frames: mpsc::Receiver<RawFrame>, manager: std::sync::Arc<UserDataManager>) {
    let mut pipeline = Pipeline::new();
    let mut decoder = NullDecoder;
    let mut maintenance = tokio::time::interval(Duration::from_secs(10));

    loop {
        tokio::select! {
            frame = raw_frames.recv() => {
                let Some(frame) = frame else {
                    info!("capture channel closed, processing task exiting");
                    return;
                };
                let now = Instant::now();
                match pipeline.process_raw_frame(&frame, now) {
                    Ok(events) => handle_events(events, &manager, &mut decoder),
                    Err(err) => {
                        error!(%err, "frame-stream corruption detected, terminating");
                        std::process::exit(1);
                    }
                }
            }
            _ = maintenance.tick() => {
                let now = Instant::now();
                pipeline.evict_stale_fragments(now);
                pipeline.check_stall(now);
            }
        }
    }
}

fn handle_events(events: Vec<PipelineEvent>, manager: &std::sync::Arc<UserDataManager>, decoder: &mut NullDecoder) {
    for event in events {
        match event {
            PipelineEvent::FlowLocked(_) => {
                manager.on_server_change(now_ms());
            }
            PipelineEvent::Frame(payload) => {
                decoder.decode(ApplicationFrame { payload }, manager.as_ref());
            }
        }
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
