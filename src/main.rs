// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 The neonlink-core Authors

//! NeonLink telemetry server: samples host sensors at a configurable
//! cadence and broadcasts them to WebSocket clients, accepting a small
//! whitelisted command vocabulary (§4.9).

mod broadcaster;
mod cache;
mod channel;
mod clock;
mod command;
mod config;
mod connection_manager;
mod discovery;
mod error;
mod sampler;
mod security;
mod server;
mod session;
mod snapshot;
mod sampling_loop;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::Mutex;
use tracing::{error, info};

use channel::TelemetryChannel;
use clock::{Clock, SystemClock};
use command::scripts::ScriptRegistry;
use command::CommandDispatcher;
use config::SharedConfig;
use error::NeonLinkError;
use sampler::{HostSampler, MockSampler, Sampler};
use server::AppState;

/// NeonLink telemetry broadcaster
#[derive(Parser, Debug)]
#[command(name = "neonlink-server")]
#[command(about = "Samples host sensors and broadcasts telemetry over WebSocket")]
#[command(version)]
struct Args {
    /// WebSocket/HTTP listen port
    #[arg(long)]
    port: Option<u16>,

    /// Bind address
    #[arg(long)]
    bind: Option<String>,

    /// Path to a JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Use the deterministic mock sampler instead of real hardware probes
    #[arg(long)]
    mock: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let exit_code = run(args).await;
    std::process::exit(exit_code);
}

async fn run(args: Args) -> i32 {
    let mut config = match config::Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return e.exit_code();
        }
    };

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = &args.bind {
        match bind.parse() {
            Ok(addr) => config.server.bind_address = addr,
            Err(_) => {
                eprintln!("invalid --bind address: {bind}");
                return NeonLinkError::ConfigInvalid("invalid bind address".into()).exit_code();
            }
        }
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }

    init_logging(&config.logging.level);
    info!(version = env!("CARGO_PKG_VERSION"), "starting neonlink-server");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let started_at_ms = clock.now_ms();
    let shared_config = SharedConfig::new(config.clone());

    let sampler: Box<dyn Sampler> = if args.mock {
        info!("using mock sampler");
        Box::new(MockSampler::default())
    } else {
        Box::new(HostSampler::new())
    };
    let sampler = Arc::new(Mutex::new(sampler));

    let scripts = ScriptRegistry::new(vec![]);
    let dispatcher = Arc::new(CommandDispatcher::new(shared_config.clone(), scripts, clock.as_ref()));
    let manager = Arc::new(connection_manager::ConnectionManager::new());
    let telemetry = Arc::new(TelemetryChannel::new());
    let shutdown = Arc::new(tokio::sync::Notify::new());

    let sampling_stats = Arc::new(sampling_loop::SamplingStats::default());
    let sampling_task = tokio::spawn(sampling_loop::run(
        sampler.clone(),
        shared_config.clone(),
        clock.clone(),
        telemetry.publisher(),
        sampling_stats,
        shutdown.clone(),
    ));

    let broadcast_task = tokio::spawn(broadcaster::run(telemetry.subscriber(), manager.clone(), shutdown.clone()));

    let heartbeat_task = tokio::spawn(heartbeat_sweep(manager.clone(), shared_config.clone(), clock.clone(), shutdown.clone()));

    let discovery_task = tokio::spawn(discovery::run(config.server.port, config.server.discovery_port, shutdown.clone()));

    let state = Arc::new(AppState {
        config: shared_config,
        manager,
        dispatcher,
        clock,
        telemetry,
        command_slots: Arc::new(tokio::sync::Semaphore::new(64)),
        started_at_ms,
        shutdown: shutdown.clone(),
    });

    let addr = SocketAddr::new(config.server.bind_address, config.server.port);
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, "failed to bind listener");
            shutdown.notify_waiters();
            return NeonLinkError::BindFailed(e).exit_code();
        }
    };
    info!(%addr, "listening");

    let app = server::router(state);
    let serve_result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(wait_for_shutdown_signal(shutdown.clone()))
    .await;

    if let Err(e) = serve_result {
        error!(error = %e, "server error");
    }

    shutdown.notify_waiters();
    let _ = tokio::join!(sampling_task, broadcast_task, heartbeat_task, discovery_task);
    info!("shutdown complete");
    0
}

async fn wait_for_shutdown_signal(shutdown: Arc<tokio::sync::Notify>) {
    let _ = tokio::signal::ctrl_c().await;
    info!("received shutdown signal");
    shutdown.notify_waiters();
}

async fn heartbeat_sweep(
    manager: Arc<connection_manager::ConnectionManager>,
    config: SharedConfig,
    clock: Arc<dyn Clock>,
    shutdown: Arc<tokio::sync::Notify>,
) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(config.load().server.heartbeat_interval_ms));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let timeout_ms = config.load().server.ping_timeout_ms;
                let expired = manager.sweep_idle(clock.now_ms(), timeout_ms).await;
                if !expired.is_empty() {
                    info!(count = expired.len(), "closed idle sessions");
                }
            }
            _ = shutdown.notified() => break,
        }
    }
}

fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}
