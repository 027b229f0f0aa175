//! Sotto relay server binary.
//!
//! # Usage
//!
//! ```bash
//! # Start with self-signed certificate (development)
//! sottod --bind 0.0.0.0:4433
//!
//! # Start with TLS certificate (production)
//! sottod --bind 0.0.0.0:4433 --cert cert.pem --key key.pem
//! ```

use std::time::Duration;

use clap::Parser;
use sotto_server::{RelayConfig, Server, ServerRuntimeConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Sotto encrypted chat relay server
#[derive(Parser, Debug)]
#[command(name = "sottod")]
#[command(about = "Ciphertext broadcast relay for sotto")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:4433")]
    bind: String,

    /// Path to TLS certificate (PEM format)
    #[arg(short, long)]
    cert: Option<String>,

    /// Path to TLS private key (PEM format)
    #[arg(short, long)]
    key: Option<String>,

    /// History retention window in seconds
    #[arg(long, default_value = "600")]
    history_window_secs: u64,

    /// History eviction period in seconds
    #[arg(long, default_value = "60")]
    evict_interval_secs: u64,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("sotto relay starting");
    tracing::info!("binding to {}", args.bind);

    if args.cert.is_none() || args.key.is_none() {
        tracing::warn!("no TLS certificate provided - using self-signed certificate");
        tracing::warn!("this is NOT suitable for production use!");
    }

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        cert_path: args.cert,
        key_path: args.key,
        evict_interval: Duration::from_secs(args.evict_interval_secs),
        relay: RelayConfig {
            history_window: Duration::from_secs(args.history_window_secs),
            max_connections: args.max_connections,
        },
    };

    let server = Server::bind(config)?;

    tracing::info!("relay listening on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}
