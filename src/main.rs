//! Stats Proxy
//!
//! Edge proxy in front of the balldontlie stats API.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────┐
//!                        │                   STATS PROXY                    │
//!                        │                                                  │
//!   Browser request      │  ┌─────────┐   ┌───────────┐   ┌──────────────┐  │
//!   ─────────────────────┼─▶│  http   │──▶│ security  │──▶│   upstream   │──┼──▶ Stats API
//!                        │  │ server  │   │ gate/token│   │ allow-list + │  │
//!                        │  └─────────┘   │ rate limit│   │  forwarder   │  │
//!   Browser response     │       ▲        └───────────┘   └──────┬───────┘  │
//!   ◀────────────────────┼───────┴───────────────────────────────┘          │
//!                        │                                                  │
//!                        │  config (TOML + hot reload)   observability      │
//!                        │  lifecycle (signals, drain)   (tracing, metrics) │
//!                        └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use stats_proxy::config::watcher::ConfigWatcher;
use stats_proxy::config::Secrets;
use stats_proxy::http::HttpServer;
use stats_proxy::lifecycle::signals::shutdown_signal;
use stats_proxy::lifecycle::startup::{bind_listener, load_startup_config};
use stats_proxy::lifecycle::Shutdown;
use stats_proxy::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "stats-proxy", version, about = "Edge proxy for the sports stats API")]
struct Args {
    /// TOML config file; defaults are used when omitted
    #[arg(short, long, env = "STATS_PROXY_CONFIG")]
    config: Option<PathBuf>,

    /// Override listener.bind_address
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = load_startup_config(args.config.as_deref(), args.bind.as_deref())?;
    logging::init_logging(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "stats-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.base_url,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let (config_updates, _watcher) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (updates, Some(watcher.run()?))
        }
        None => (tokio::sync::mpsc::unbounded_channel().1, None),
    };

    let listener = bind_listener(&config).await?;
    let server = HttpServer::new(config, Secrets::from_env())?;

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let server_task = tokio::spawn(server.run(listener, config_updates, server_shutdown));

    shutdown_signal().await;
    shutdown.trigger();

    server_task.await??;
    tracing::info!("Shutdown complete");
    Ok(())
}
