// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! fox-bridge - expose bus topics and services to visualization clients.
//!
//! Discovered topics are advertised as channels; clients subscribe,
//! publish their own topics, call allow-listed services, and read/write
//! parameters. Control messages are JSON text frames; channel payloads are
//! binary frames (4-byte LE channel id + canonical bytes).
//!
//! # Usage
//!
//! ```bash
//! # Default bind 127.0.0.1:8765
//! fox-bridge
//!
//! # Custom port and faster discovery
//! fox-bridge --port 9090 --discovery-interval 250
//! ```

mod protocol;
mod session;
mod ws_sink;

use axum::{
    extract::{ws::WebSocket, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
    Router,
};
use clap::Parser;
use cybus::Bus;
use cybus_bridge::{DiscoveryEngine, FanoutHub, ServiceTable, Sink};
use cybus_schema::{ConverterRegistry, SchemaRegistry};
use session::ClientSession;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use ws_sink::WsSink;

/// Bus-to-WebSocket visualization bridge
#[derive(Parser, Debug, Clone)]
#[command(name = "fox-bridge")]
#[command(about = "Expose bus topics and services over WebSocket")]
#[command(version)]
struct Args {
    /// WebSocket server port
    #[arg(short, long, default_value = "8765")]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value = "127.0.0.1")]
    bind: String,

    /// Bus process name
    #[arg(long, default_value = "fox_bridge")]
    name: String,

    /// Topic discovery interval in milliseconds
    #[arg(long, default_value = "500")]
    discovery_interval: u64,

    /// Maximum concurrent WebSocket connections
    #[arg(long, default_value = "100")]
    max_clients: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Shared application state
struct AppState {
    hub: Arc<FanoutHub>,
    sink: Arc<WsSink>,
    config: Args,
    client_count: RwLock<usize>,
}

impl AppState {
    async fn can_accept_client(&self) -> bool {
        *self.client_count.read().await < self.config.max_clients
    }

    async fn add_client(&self) {
        let mut count = self.client_count.write().await;
        *count += 1;
        info!("client connected, total {}", *count);
    }

    async fn remove_client(&self) {
        let mut count = self.client_count.write().await;
        *count = count.saturating_sub(1);
        info!("client disconnected, total {}", *count);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = args.log_level.parse().unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_target(false)
        .init();

    info!("fox-bridge v{}", env!("CARGO_PKG_VERSION"));

    let bus = Bus::builder(&args.name).build();
    let registry = Arc::new(SchemaRegistry::new());
    let converters = Arc::new(ConverterRegistry::empty());
    let sink = Arc::new(WsSink::new());

    let hub = Arc::new(FanoutHub::new(
        Arc::clone(&bus),
        Arc::clone(&registry),
        converters,
        Arc::clone(&sink) as Arc<dyn Sink>,
    ));

    let running = Arc::new(AtomicBool::new(true));
    let engine = DiscoveryEngine::new(bus, registry, ServiceTable::builtin());
    let discovery = engine.spawn(
        FanoutHub::discovery_events(&hub),
        Duration::from_millis(args.discovery_interval),
        Arc::clone(&running),
    );

    let addr = format!("{}:{}", args.bind, args.port);
    let state = Arc::new(AppState {
        hub,
        sink,
        config: args,
        client_count: RwLock::new(0),
    });

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("websocket endpoint: ws://{}/ws", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let shutdown_running = Arc::clone(&running);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
            shutdown_running.store(false, Ordering::SeqCst);
        })
        .await?;

    running.store(false, Ordering::SeqCst);
    let _ = discovery.join();

    Ok(())
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if !state.can_accept_client().await {
        warn!("connection rejected, max clients reached");
        return (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            "too many connections",
        )
            .into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state))
        .into_response()
}

/// Handle one WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    state.add_client().await;

    let session = ClientSession::new(Arc::clone(&state.hub), Arc::clone(&state.sink));
    if let Err(e) = session.run(socket, &state.config.name).await {
        error!("session error: {}", e);
    }

    state.remove_client().await;
}

/// Health check endpoint
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let count = *state.client_count.read().await;

    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "clients": count,
        "max_clients": state.config.max_clients,
        "channels": state.sink.snapshot_channels().len(),
    }))
}
