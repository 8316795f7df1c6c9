//! The name service: owns the hierarchical namespace, the cluster roster,
//! and block placement. One accept loop, one task per connection.

mod cluster;
mod handlers;
mod namespace;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use common::settings::ClusterSettings;
use handlers::{NameService, handle_connection};
use namespace::Namespace;
use tokio::net::TcpSocket;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
struct Args {
    /// Directory the fsimage is stored in.
    root: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "namenode=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let settings = ClusterSettings::default();

    let namespace = Namespace::load_or_create(args.root.join("fsimage"), settings.inode_capacity)
        .context("failed to load namespace")?;
    let service = Arc::new(NameService::new(settings.clone(), namespace));

    let (host, port) = &settings.namenode_addr;
    let addr = tokio::net::lookup_host((host.as_str(), *port))
        .await?
        .next()
        .context("failed to resolve listen address")?;
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.bind(addr)?;
    let listener = socket.listen(settings.accept_backlog)?;
    info!(%addr, "name service listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, service).await {
                warn!(%peer, error = %e, "connection failed");
            }
        });
    }
}
