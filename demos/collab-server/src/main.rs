//! Collaborative debugging server.
//!
//! Connects to one debug adapter over TCP and lets any number of debugger
//! front ends share it over WebSocket.
//!
//! Run with: cargo run -p collab-server -- --adapter 127.0.0.1:4712
//!
//! The first front end to connect to `ws://localhost:4711/ws` drives the
//! debug session; later ones join once it has sent `initialize`.

mod config;

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use axum::Router;
use clap::Parser;
use dap_mux_session::Signal;
use dap_mux_transport::{AdapterConnection, HubHandle, MuxHub, websocket::create_ws_router};
use tokio::task::JoinHandle;
use tokio_stream::{Stream, StreamExt};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServerConfig;

#[derive(Debug, Parser)]
#[command(name = "collab-server", version, about)]
struct Args {
    /// Config file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to serve front ends on
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// TCP address of the debug adapter
    #[arg(long)]
    adapter: Option<String>,

    /// Local workspace root used for source path rewriting
    #[arg(long)]
    workspace: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load_from(path)?,
            None => ServerConfig::load()?,
        };
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(adapter) = self.adapter {
            config.adapter = adapter;
        }
        if let Some(workspace) = self.workspace {
            config.mux.workspace_root = workspace;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Args::parse().into_config()?;
    tracing::info!(
        workspace = %config.mux.workspace_root.display(),
        adapter = %config.adapter,
        "Starting collab server"
    );

    let (adapter, messages) = AdapterConnection::connect(config.adapter.as_str())
        .await
        .with_context(|| format!("Failed to connect to adapter at {}", config.adapter))?;
    let hub = MuxHub::spawn(config.mux.clone(), Arc::new(adapter));
    let forwarder = hub.forward_adapter(messages);
    tokio::spawn(supervise(
        hub.clone(),
        hub.signals(),
        config.adapter.clone(),
        forwarder,
    ));

    let app = Router::new()
        .merge(create_ws_router(hub))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;
    tracing::info!("Server listening on ws://{}/ws", config.listen);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Reconnect the adapter whenever the multiplexer restarts.
async fn supervise(
    hub: HubHandle,
    mut signals: impl Stream<Item = Signal> + Unpin,
    adapter_addr: String,
    mut forwarder: JoinHandle<()>,
) {
    while let Some(signal) = signals.next().await {
        match signal {
            Signal::Joinable => tracing::info!("Adapter initialized, collaborators may join"),
            Signal::Restart => {
                forwarder.abort();
                match AdapterConnection::connect(adapter_addr.as_str()).await {
                    Ok((adapter, messages)) => {
                        if hub.replace_adapter(Arc::new(adapter)).is_err() {
                            break;
                        }
                        forwarder = hub.forward_adapter(messages);
                        tracing::info!("Reconnected to adapter for restart");
                    }
                    Err(e) => tracing::error!("Failed to reconnect to adapter: {e}"),
                }
            }
        }
    }
}
