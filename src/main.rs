//! HTTP access-logging echo server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ─────────────▶ listener ─▶ access log middleware ─▶ echo handler
//!                                   │   (snapshot, start)        │
//!                                   │                            ▼
//!     Client Response               │                      response body
//!     ◀───────────── observed body ◀┴──── ResponseObserver ◀─────┘
//!                         │
//!                         ▼
//!                   RecordBuilder ─▶ DiagnosticSink (tracing)
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use httpd_access_log::config::{load_config, ShimConfig};
use httpd_access_log::http::HttpServer;

#[derive(Parser)]
#[command(name = "httpd-access-log")]
#[command(about = "Echo server with common-log-format access logging", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ShimConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    // Initialize tracing subscriber
    let default_filter = format!(
        "httpd_access_log={level},access_log={level}",
        level = config.observability.log_level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("httpd-access-log v0.1.0 starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        format = ?config.access_log.format,
        request_id_header = %config.access_log.request_id_header,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        "Listening for connections"
    );

    let server = HttpServer::new(config);
    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
