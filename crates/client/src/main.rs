mod capture;
mod channel;
mod cli;
mod config;
mod error;
mod relay;
mod render;
mod session;
mod signaling;
mod source;
mod supervisor;

use std::sync::Arc;

use tracing::{error, info, warn};

use capture::Sampler;
use cli::Mode;
use relay::RelayClient;
use render::{LogSink, RenderSink};
use source::{FrameSource, TestPatternSource};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = cli::parse_args()?;
    let mut config = config::load_config(&args.config_path)?;
    if let Some(width) = args.width {
        config.capture.width = width;
    }
    if let Some(height) = args.height {
        config.capture.height = height;
    }
    if let Some(interval_ms) = args.interval_ms {
        config.capture.interval_ms = interval_ms;
    }

    if let Err(issues) = config.validate() {
        let mut fatal = false;
        for issue in &issues {
            if issue.starts_with("ERROR:") {
                fatal = true;
                error!("{issue}");
            } else {
                warn!("{issue}");
            }
        }
        if fatal {
            std::process::exit(1);
        }
    }

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Ctrl-C handler failed: {e}");
            return;
        }
        info!("Received SIGINT, shutting down");
        let _ = shutdown_tx.send(true);
    });

    let render: Arc<dyn RenderSink> = Arc::new(LogSink::new());
    let width = config.capture.width;
    let height = config.capture.height;

    match args.mode {
        Mode::P2p => {
            info!(width, height, "Starting tint-client in P2P mode");
            let open_source = move || {
                Ok(Box::new(TestPatternSource::new(width, height)) as Box<dyn FrameSource>)
            };
            if let Err(e) = signaling::run_p2p(&config, open_source, render, &mut shutdown_rx).await
            {
                error!("P2P session failed: {e:#}");
                std::process::exit(1);
            }
        }
        Mode::Relay => {
            info!(width, height, url = %config.relay.url(), "Starting tint-client in relay mode");
            // One client for the whole run: the sampler and its surface
            // survive reconnects.
            let sampler = Sampler::new(Box::new(TestPatternSource::new(width, height)));
            let mut client = RelayClient::new(
                config.relay.url(),
                config.capture.interval(),
                config.capture.jpeg_quality,
                sampler,
                render,
            );
            supervisor::supervise(&mut client, supervisor::RECONNECT_DELAY, &mut shutdown_rx).await;
        }
    }

    info!("Client shutdown complete");
    Ok(())
}
