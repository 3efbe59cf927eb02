mod config;
mod overlay;
mod relay;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::connect_info::ConnectInfo;
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::overlay::RectangleOverlay;

pub(crate) struct AppState {
    pub overlay: RectangleOverlay,
    /// Quality for re-encoding processed frames.
    pub jpeg_quality: u8,
    pub max_message_bytes: usize,
}

fn parse_args() -> (PathBuf, Option<u16>) {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = PathBuf::from("./config/tint.toml");
    let mut port_override = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    port_override = args[i + 1].parse().ok();
                    i += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }

    (config_path, port_override)
}

async fn relay_upgrade(
    State(state): State<Arc<AppState>>,
    ConnectInfo(who): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    tracing::debug!(%who, "Relay WebSocket upgrade");
    ws.max_message_size(state.max_message_bytes)
        .on_upgrade(move |socket| relay::handle_socket(socket, who, state))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let (config_path, port_override) = parse_args();

    let mut config = config::load_config(&config_path)?;
    if let Some(p) = port_override {
        config.relay.port = p;
    }
    if let Err(issues) = config.validate() {
        let has_errors = issues.iter().any(|i| i.starts_with("ERROR:"));
        for issue in &issues {
            if issue.starts_with("ERROR:") {
                tracing::error!("{}", issue);
            } else {
                tracing::warn!("{}", issue);
            }
        }
        if has_errors {
            tracing::error!(
                "Configuration has {} issue(s). Fix the ERROR(s) above and restart.",
                issues.len()
            );
            std::process::exit(1);
        }
    }

    let bind_addr: SocketAddr = format!("{}:{}", config.relay.host, config.relay.port)
        .parse()
        .context("Invalid bind address")?;

    let state = Arc::new(AppState {
        overlay: RectangleOverlay::new(&config.overlay),
        jpeg_quality: config.capture.jpeg_quality,
        max_message_bytes: config.relay.max_message_bytes,
    });

    let app = Router::new()
        .route(&config.relay.path, get(relay_upgrade))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {bind_addr}"))?;

    tracing::info!("Tint relay server listening on ws://{bind_addr}{}", config.relay.path);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Ctrl-C handler failed: {e}");
            return;
        }
        tracing::info!("Received SIGINT, shutting down");
    })
    .await
    .context("Server error")?;

    tracing::info!("Tint relay server shut down cleanly");
    Ok(())
}
