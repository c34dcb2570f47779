//! workspaces-relay: signaling relay for WebRTC workspaces.
//!
//! Keeps the roster of every workspace, checks access tokens, and forwards
//! call setup and ICE traffic between attendees. Media never passes through
//! the relay.

mod connection;
mod router;
mod state;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use workspaces_config::{toml_loader, IceServerConfig, WorkspacesConfig};
use workspaces_core::protocol::IceServer;

use crate::connection::handle_connection;
use crate::router::Router;
use crate::state::RelayState;

/// Interval between stale workspace sweeps.
const REAP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "workspaces-relay", about = "Signaling relay for WebRTC workspaces")]
struct Args {
    /// Port to listen on (overrides the config file).
    #[arg(short, long)]
    port: Option<u16>,

    /// Config file to load instead of the platform default.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds a workspace with nobody connected survives (overrides the config file).
    #[arg(long)]
    session_ttl: Option<u64>,
}

fn ice_server(config: &IceServerConfig) -> IceServer {
    IceServer {
        urls: config.urls.clone(),
        username: config.username.clone(),
        credential: config.credential.clone(),
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let loaded = match &args.config {
        Some(path) => toml_loader::load_from_path(path),
        None => workspaces_config::load_config(),
    };
    let (config, load_error) = match loaded {
        Ok(config) => (config, None),
        Err(e) => (WorkspacesConfig::default(), Some(e)),
    };

    let fallback = format!("workspaces_relay={}", config.logging.level.as_filter());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .init();

    if let Some(e) = load_error {
        if args.config.is_some() {
            tracing::error!(error = %e, "Failed to load config");
            std::process::exit(1);
        }
        tracing::warn!(error = %e, "Failed to load config, using defaults");
    }

    let relay = &config.relay;
    let port = args.port.unwrap_or(relay.port);
    let ttl = Duration::from_secs(args.session_ttl.unwrap_or(u64::from(relay.session_ttl_secs)));
    let ice_servers = relay.ice_servers.iter().map(ice_server).collect();
    let router = Router::new(RelayState::new(), ice_servers, relay.max_attendees as usize);

    let addr = format!("0.0.0.0:{port}");
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind TCP listener");
            std::process::exit(1);
        }
    };

    tracing::info!(
        max_attendees = relay.max_attendees,
        ttl_secs = ttl.as_secs(),
        "workspaces-relay listening on {}",
        addr
    );

    let reaper_state = router.state().clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(REAP_INTERVAL).await;
            reaper_state.reap_stale(ttl).await;
            let count = reaper_state.count().await;
            tracing::debug!(workspaces = count, "Reaper tick");
        }
    });

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let router = router.clone();
                tokio::spawn(async move {
                    match accept_async(stream).await {
                        Ok(ws) => handle_connection(ws, addr, router).await,
                        Err(e) => {
                            tracing::warn!(peer = %addr, error = %e, "WS handshake failed");
                        }
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept error");
            }
        }
    }
}
