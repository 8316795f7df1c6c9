//! Cluster admission.
//!
//! A node joins by presenting its version and namespace id to the name
//! service. A first-time node has no namespace id yet: the reply carries
//! the cluster's id with a failed verdict, and the node persists the id
//! and tries again. Anything else that fails is fatal.

use std::path::Path;

use anyhow::bail;
use common::WireError;
use common::framing::Framed;
use common::message::{HandshakeMessage, NameRequest};
use common::settings::ClusterSettings;
use tracing::{info, warn};

use crate::config::NodeConfig;

/// One handshake round trip. On acceptance the namespace id from the reply
/// is folded into `config`.
async fn attempt(config: &mut NodeConfig, settings: &ClusterSettings) -> Result<bool, WireError> {
    let mut framed = Framed::connect(&config.namenode_addr, settings.idle_timeout).await?;
    let message = HandshakeMessage {
        software_version: config.software_version.clone(),
        datanode_id: config.datanode_id.clone(),
        namespace_id: config.namespace_id.clone(),
        address_tuple: config.listen_addr.clone(),
        handshake: None,
    };
    framed.send_json(&NameRequest::Handshake(message)).await?;
    let reply: HandshakeMessage = framed.recv_json().await?;

    if reply.handshake == Some(true) {
        config.namespace_id = reply.namespace_id;
        return Ok(true);
    }
    if config.namespace_id.is_none() {
        // First contact: adopt the assigned namespace id so the retry can
        // present it back.
        if let Some(namespace_id) = reply.namespace_id {
            config.namespace_id = Some(namespace_id);
        }
    }
    Ok(false)
}

/// Joins the cluster, persisting the learned namespace id and retrying
/// once for first-time nodes. Persistent rejection is fatal.
pub async fn register(
    config: &mut NodeConfig,
    root: &Path,
    settings: &ClusterSettings,
) -> anyhow::Result<()> {
    let first_time = config.namespace_id.is_none();
    if attempt(config, settings).await? {
        info!("successful handshake");
        return Ok(());
    }
    if first_time && config.namespace_id.is_some() {
        warn!("handshake deferred, retrying with the assigned namespace id");
        config.persist(root)?;
        if attempt(config, settings).await? {
            info!("successful handshake");
            return Ok(());
        }
    }
    bail!("name service rejected handshake");
}
