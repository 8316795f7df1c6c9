//! The data node: loads its identity, joins the cluster, reports its
//! blocks, and serves pipeline writes and client reads.

mod config;
mod handlers;
mod handshake;
mod heartbeat;
mod store;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use common::settings::ClusterSettings;
use config::NodeConfig;
use store::BlockStore;
use tokio::net::TcpSocket;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
struct Args {
    /// Directory holding this node's config and block files.
    root: PathBuf,
    /// Port this node listens on.
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "datanode=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let settings = ClusterSettings::default();

    let mut config = NodeConfig::load_or_default(&args.root, args.port, &settings)?;
    let store = Arc::new(BlockStore::open(&args.root).context("failed to open block store")?);

    handshake::register(&mut config, &args.root, &settings).await?;
    config.persist(&args.root)?;

    tokio::spawn(heartbeat::run(
        config.datanode_id.clone(),
        config.namenode_addr.clone(),
        Arc::clone(&store),
        settings.heartbeat_period,
        settings.idle_timeout,
    ));

    let (host, port) = &config.listen_addr;
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
    info!(%addr, datanode_id = %config.datanode_id, "datanode listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let store = Arc::clone(&store);
        let idle_timeout = settings.idle_timeout;
        tokio::spawn(async move {
            if let Err(e) = handlers::handle_connection(stream, store, idle_timeout).await {
                warn!(%peer, error = %e, "connection failed");
            }
        });
    }
}
