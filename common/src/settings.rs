use std::time::Duration;

use crate::message::NodeAddr;

/// Cluster-wide constants, fixed at build time and threaded into every
/// process as one immutable record.
#[derive(Debug, Clone)]
pub struct ClusterSettings {
    /// Data nodes must present exactly this version to be admitted.
    pub software_version: String,
    /// Identifier every member of the cluster must share.
    pub namespace_id: String,
    /// Number of distinct data nodes each new block is written to.
    pub replication_factor: usize,
    pub heartbeat_period: Duration,
    /// Per-connection idle timeout on every socket operation.
    pub idle_timeout: Duration,
    /// Capacity of the name service's inode table.
    pub inode_capacity: usize,
    pub namenode_addr: NodeAddr,
    pub accept_backlog: u32,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            software_version: "1.0.0".to_string(),
            namespace_id: "pythonhdfs3143".to_string(),
            replication_factor: 2,
            heartbeat_period: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(60),
            inode_capacity: 4096,
            namenode_addr: ("localhost".to_string(), 60420),
            accept_backlog: 5,
        }
    }
}
