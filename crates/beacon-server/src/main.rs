//! Beacon Server
//!
//! Runs the WebSocket signaling hub and the UDP relay in one process.
//!
//! # Usage
//!
//! ```bash
//! # Defaults (signaling on :8080, relay on udp/19302)
//! beacon-server
//!
//! # With a config file and a routable relay address
//! beacon-server --config /etc/beacon/config.toml --public-ip 203.0.113.7
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use beacon_core::Config;
use beacon_relay::{RelayServer, StaticCredentials};
use beacon_signal::SignalServer;

#[derive(Parser, Debug)]
#[command(name = "beacon-server")]
#[command(about = "Beacon signaling and relay server for peer-to-peer calls")]
#[command(version)]
struct Args {
    /// Config file path (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Signaling port
    #[arg(short, long)]
    port: Option<u16>,

    /// Signaling bind address
    #[arg(short, long)]
    bind: Option<IpAddr>,

    /// Relay UDP port
    #[arg(long)]
    relay_port: Option<u16>,

    /// Public IP advertised in relay allocations
    #[arg(long)]
    public_ip: Option<IpAddr>,

    /// Authentication realm
    #[arg(long)]
    realm: Option<String>,
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
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };

    // Flags override the config file
    if let Some(port) = args.port {
        config.signal.port = port;
    }
    if let Some(bind) = args.bind {
        config.signal.bind = bind;
    }
    if let Some(port) = args.relay_port {
        config.relay.port = port;
    }
    if let Some(ip) = args.public_ip {
        config.relay.public_ip = ip;
    }
    if let Some(realm) = args.realm {
        config.relay.realm = realm;
    }

    info!("Starting Beacon Server");

    let credentials = StaticCredentials::new(config.relay.credentials.clone());
    if credentials.is_empty() {
        warn!("No relay credentials configured; every allocation will be refused");
    }

    // Bind the relay first: if it cannot come up, do not serve signaling
    // in a half-initialized state
    let relay = RelayServer::bind(&config.relay, Arc::new(credentials)).await?;

    let signal_addr = SocketAddr::new(config.signal.bind, config.signal.port);
    let signal = SignalServer::new();
    info!("Signaling on ws://{}{}", signal_addr, beacon_signal::SIGNAL_PATH);

    tokio::select! {
        result = signal.serve(signal_addr) => result?,
        result = relay.run() => result?,
    }

    Ok(())
}
