//! The periodic block-report heartbeat.

use std::sync::Arc;
use std::time::Duration;

use common::WireError;
use common::framing::Framed;
use common::message::{HeartbeatMessage, NameRequest, NodeAddr};
use tracing::{debug, warn};

use crate::store::BlockStore;

/// Sends the full block report to the name service on a fresh connection
/// every period, forever. A failed send is logged and the next beat tries
/// again.
pub async fn run(
    datanode_id: String,
    namenode_addr: NodeAddr,
    store: Arc<BlockStore>,
    period: Duration,
    idle_timeout: Duration,
) {
    loop {
        tokio::time::sleep(period).await;
        match beat(&datanode_id, &namenode_addr, &store, idle_timeout).await {
            Ok(()) => debug!("sent heartbeat"),
            Err(e) => warn!(error = %e, "heartbeat failed"),
        }
    }
}

async fn beat(
    datanode_id: &str,
    namenode_addr: &NodeAddr,
    store: &BlockStore,
    idle_timeout: Duration,
) -> Result<(), WireError> {
    let mut framed = Framed::connect(namenode_addr, idle_timeout).await?;
    framed
        .send_json(&NameRequest::Heartbeat(HeartbeatMessage {
            datanode_id: datanode_id.to_string(),
            block_report: store.block_report(),
        }))
        .await
}
