//! GCP events converting proxy.
//!
//! Sits in front of a CloudEvents consumer and receives Pub/Sub push
//! envelopes in its place.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌───────────────────────────────────────────────┐
//!                       │              EVENTS CONVERT PROXY              │
//!                       │                                               │
//!   Push envelope       │  ┌─────────┐    ┌──────────┐    ┌──────────┐  │
//!   ────────────────────┼─▶│  http   │───▶│  filter  │───▶│ binding  │  │
//!                       │  │ server  │    │ decoder  │    │ + codec  │  │
//!                       │  └─────────┘    └──────────┘    └────┬─────┘  │
//!                       │                                      │        │    CloudEvent
//!                       │                                      └────────┼──────────────▶ Upstream
//!                       │                                               │
//!   Acknowledgment      │  ┌─────────┐    ┌──────────┐                  │
//!   ◀───────────────────┼──│  http   │◀───│  filter  │◀─────────────────┼────────────── Upstream
//!                       │  │ server  │    │ encoder  │                  │    200 / other
//!                       │  └─────────┘    └──────────┘                  │
//!                       │                                               │
//!                       │  config (hot reload) · observability · lifecycle │
//!                       └───────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use gcp_events_convert::config::{load_config, ConfigWatcher, ProxyConfig};
use gcp_events_convert::http::HttpServer;
use gcp_events_convert::lifecycle::Shutdown;
use gcp_events_convert::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "gcp-events-convert")]
#[command(about = "Converts Pub/Sub push envelopes into CloudEvents requests", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Built-in defaults when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    if args.check {
        println!("configuration OK");
        return Ok(());
    }

    logging::init_logging(&config.observability);

    tracing::info!("gcp-events-convert v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        content_type = %config.filter.content_type,
        request_timeout_secs = config.timeouts.request_secs,
        max_body_size = config.limits.max_body_size,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    // The watcher must stay alive for reloads to be delivered.
    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config)?;
    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
