//! Vanish Relay Server
//!
//! Blind signaling relay for anonymous two-party sessions.
//!
//! # Usage
//!
//! ```bash
//! # Defaults (port 8080, destroy rooms when a participant leaves)
//! vanish-relay
//!
//! # Custom port, keep half-vacated rooms until their TTL expires
//! vanish-relay --port 9000 --keep-on-leave
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vanish_core::RelayConfig;
use vanish_relay::{MemoryStore, RelayServer, SignalRelay};

#[derive(Parser, Debug)]
#[command(name = "vanish-relay")]
#[command(about = "Vanish signaling relay for anonymous two-party sessions")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind address (overrides the config file)
    #[arg(short, long)]
    bind: Option<String>,

    /// Configuration file path (uses the default location if not specified)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Leave half-vacated rooms to expire on their TTL instead of
    /// destroying them when a participant leaves
    #[arg(long)]
    keep_on_leave: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => RelayConfig::load_from(path)?,
        None => RelayConfig::load(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(bind) = &args.bind {
        config.bind = bind.parse()?;
    }
    if args.keep_on_leave {
        config.destroy_on_leave = false;
    }

    let addr: SocketAddr = (config.bind, config.port).into();

    info!("Starting Vanish Relay");
    info!(
        "Room TTL {}s, counter TTL {}s, destroy-on-leave: {}",
        config.room_ttl_secs, config.counter_ttl_secs, config.destroy_on_leave
    );

    let store = Arc::new(MemoryStore::new());
    let server = RelayServer::new(SignalRelay::new(store, config));
    server.serve(addr).await?;

    Ok(())
}
