//! Per-connection request handling for the name service.
//!
//! Each accepted connection carries one request: a handshake, a heartbeat,
//! or a client command. Engine errors are folded into `{success: false}`
//! responses; the handler itself only fails on wire problems.

use std::sync::{Arc, RwLock};

use common::WireError;
use common::framing::Framed;
use common::message::{
    Action, ClientCommand, ClientResponse, HandshakeMessage, NameRequest, addr_display,
};
use common::settings::ClusterSettings;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, warn};

use crate::cluster::Cluster;
use crate::namespace::Namespace;

/// State shared by every connection task.
pub struct NameService {
    pub settings: ClusterSettings,
    /// Writers hold this lock across the mutation and the fsimage rewrite;
    /// `ls` and `cat` only take the read side.
    pub namespace: RwLock<Namespace>,
    pub cluster: Cluster,
}

impl NameService {
    pub fn new(settings: ClusterSettings, namespace: Namespace) -> Self {
        Self {
            settings,
            namespace: RwLock::new(namespace),
            cluster: Cluster::default(),
        }
    }
}

/// Drives one accepted connection: a single request frame dispatched on its
/// `message_type`, with at most one response frame.
pub async fn handle_connection<S>(stream: S, service: Arc<NameService>) -> Result<(), WireError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(stream, service.settings.idle_timeout);
    match framed.recv_json::<NameRequest>().await? {
        NameRequest::Handshake(message) => {
            let reply = handshake(&service, message);
            framed.send_json(&NameRequest::Handshake(reply)).await
        }
        NameRequest::Heartbeat(message) => {
            service
                .cluster
                .record_report(&message.datanode_id, message.block_report);
            Ok(())
        }
        NameRequest::Client(command) => {
            let response = client_command(&service, &command);
            framed.send_json(&response).await
        }
    }
}

/// Admission decision: the software versions must match exactly and the
/// presented namespace id must equal the cluster's. A first-time node
/// (null namespace id) learns the cluster id from the reply but is not
/// admitted until it presents the id back.
fn handshake(service: &NameService, mut message: HandshakeMessage) -> HandshakeMessage {
    let settings = &service.settings;
    let versions_match = message.software_version == settings.software_version;
    let accepted = versions_match
        && message.namespace_id.as_deref() == Some(settings.namespace_id.as_str());

    if message.namespace_id.is_none() {
        message.namespace_id = Some(settings.namespace_id.clone());
    }
    if accepted {
        info!(
            datanode_id = %message.datanode_id,
            addr = %addr_display(&message.address_tuple),
            "datanode admitted"
        );
        service
            .cluster
            .admit(message.datanode_id.clone(), message.address_tuple.clone());
    } else {
        warn!(datanode_id = %message.datanode_id, versions_match, "handshake rejected");
    }
    message.handshake = Some(accepted);
    message
}

fn client_command(service: &NameService, command: &ClientCommand) -> ClientResponse {
    let path = command.path.as_str();
    match command.action_type {
        Action::Mkdir => {
            let mut namespace = service.namespace.write().unwrap();
            match namespace.mkdir(path) {
                Ok(()) => ClientResponse::ok(),
                Err(e) => ClientResponse::failure(e.to_string()),
            }
        }
        Action::Rmdir => {
            let mut namespace = service.namespace.write().unwrap();
            match namespace.rmdir(path) {
                Ok(()) => ClientResponse::ok(),
                Err(e) => ClientResponse::failure(e.to_string()),
            }
        }
        Action::Rm => {
            // Forgets the inode only; no data node is told to drop the
            // block bytes.
            let mut namespace = service.namespace.write().unwrap();
            match namespace.rmfile(path) {
                Ok(_block_id) => ClientResponse::ok(),
                Err(e) => ClientResponse::failure(e.to_string()),
            }
        }
        Action::Ins => {
            let mut namespace = service.namespace.write().unwrap();
            let block_id = match namespace.mkfile(path) {
                Ok(block_id) => block_id,
                Err(e) => return ClientResponse::failure(e.to_string()),
            };
            // The inode is already committed; a placement failure below
            // still leaves it in the namespace.
            match service
                .cluster
                .sample_replicas(service.settings.replication_factor)
            {
                Some(datanodes) => ClientResponse {
                    block_id: Some(block_id),
                    datanodes: Some(datanodes),
                    ..ClientResponse::ok()
                },
                None => ClientResponse::failure(format!(
                    "need {} datanodes to place block {}",
                    service.settings.replication_factor, block_id
                )),
            }
        }
        Action::Ls => {
            let namespace = service.namespace.read().unwrap();
            match namespace.list(path) {
                Ok(contents) => ClientResponse {
                    contents: Some(contents),
                    ..ClientResponse::ok()
                },
                Err(e) => ClientResponse::failure(e.to_string()),
            }
        }
        Action::Cat => {
            let block_id = match service.namespace.read().unwrap().lookup_block(path) {
                Ok(block_id) => block_id,
                Err(e) => return ClientResponse::failure(e.to_string()),
            };
            let datanode_addrs = service.cluster.locate(&block_id);
            if datanode_addrs.is_empty() {
                return ClientResponse::failure(format!("datanode not found for block {block_id}"));
            }
            ClientResponse {
                block_id: Some(block_id),
                datanode_addrs: Some(datanode_addrs),
                ..ClientResponse::ok()
            }
        }
    }
}
