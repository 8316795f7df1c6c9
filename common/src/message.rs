//! Wire message shapes.
//!
//! Every control frame on the wire is a JSON object carrying a mandatory
//! `message_type` field. The request enums here are internally tagged on
//! that field, so a single `recv_json` call both parses and dispatches a
//! connection's first frame.

use serde::{Deserialize, Serialize};

/// A node endpoint, serialized as the `[host, port]` array the protocol
/// uses everywhere addresses appear.
pub type NodeAddr = (String, u16);

/// Renders an address as `host:port` for log lines.
pub fn addr_display(addr: &NodeAddr) -> String {
    format!("{}:{}", addr.0, addr.1)
}

/// Everything the name service accepts as a connection's first frame.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "message_type")]
pub enum NameRequest {
    #[serde(rename = "DATANODE_HANDSHAKE")]
    Handshake(HandshakeMessage),
    #[serde(rename = "DATANODE_HEARTBEAT")]
    Heartbeat(HeartbeatMessage),
    #[serde(rename = "CLIENT")]
    Client(ClientCommand),
}

/// Everything a data node accepts as a connection's first frame.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "message_type")]
pub enum DataRequest {
    #[serde(rename = "WRITE_PIPELINE")]
    WritePipeline(WritePipeline),
    #[serde(rename = "CLIENT_READ")]
    ClientRead(ClientRead),
}

/// The handshake travels in both directions: a joining node sends it with
/// `handshake: null`, and the name service echoes it back with the verdict
/// filled in and the cluster's namespace id set.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HandshakeMessage {
    pub software_version: String,
    pub datanode_id: String,
    pub namespace_id: Option<String>,
    pub address_tuple: NodeAddr,
    pub handshake: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HeartbeatMessage {
    pub datanode_id: String,
    /// The full list of block ids the node currently holds.
    pub block_report: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ClientCommand {
    pub action_type: Action,
    pub path: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Mkdir,
    Rmdir,
    Rm,
    Ins,
    Ls,
    Cat,
}

/// The name service's reply to any [`ClientCommand`]. Only the fields the
/// action produced are present on the wire.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ClientResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_id: Option<String>,
    /// Pipeline targets returned by `ins`, in write order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datanodes: Option<Vec<NodeAddr>>,
    /// Every node whose last report contained the block, returned by `cat`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datanode_addrs: Option<Vec<NodeAddr>>,
    /// `(name, kind)` pairs returned by `ls`, with kind `"f"` or `"d"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contents: Option<Vec<(String, String)>>,
}

impl ClientResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Header of a pipelined block write; one data frame with the block bytes
/// follows it on the same connection.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WritePipeline {
    pub block_id: String,
    /// The remaining downstream chain. Each node persists the block, then
    /// forwards to the head of this list with the list shortened by one.
    pub datanodes: Vec<NodeAddr>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ClientRead {
    pub block_id: String,
}

/// A data node's reply to [`ClientRead`]; on success one data frame with
/// the block bytes follows.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ReadResponse {
    pub success: bool,
}
