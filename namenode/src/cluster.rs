//! Cluster membership and the block-location index.
//!
//! Nodes enter through the handshake and are never evicted; what each one
//! holds is known only through its latest block report. Both maps are
//! last-writer-wins: every message performs exactly one write, and readers
//! tolerate a slightly stale view because clients re-validate by contacting
//! the data nodes themselves.

use std::collections::HashMap;
use std::sync::RwLock;

use common::message::NodeAddr;
use rand::seq::SliceRandom;
use tracing::debug;

#[derive(Default)]
pub struct Cluster {
    /// Admitted nodes by datanode id.
    datanodes: RwLock<HashMap<String, NodeAddr>>,
    /// Latest block report by datanode id, replaced wholesale on each
    /// heartbeat.
    blocks: RwLock<HashMap<String, Vec<String>>>,
}

impl Cluster {
    /// Records an admitted node's address, replacing any prior entry.
    pub fn admit(&self, datanode_id: String, addr: NodeAddr) {
        self.datanodes.write().unwrap().insert(datanode_id, addr);
    }

    /// Overwrites a node's block report.
    pub fn record_report(&self, datanode_id: &str, block_report: Vec<String>) {
        debug!(datanode_id, blocks = block_report.len(), "block report");
        self.blocks
            .write()
            .unwrap()
            .insert(datanode_id.to_string(), block_report);
    }

    /// Samples `count` distinct member addresses uniformly at random, in
    /// pipeline order. `None` when membership is too small.
    pub fn sample_replicas(&self, count: usize) -> Option<Vec<NodeAddr>> {
        let datanodes = self.datanodes.read().unwrap();
        if datanodes.len() < count {
            return None;
        }
        let addrs: Vec<NodeAddr> = datanodes.values().cloned().collect();
        Some(
            addrs
                .choose_multiple(&mut rand::thread_rng(), count)
                .cloned()
                .collect(),
        )
    }

    /// Every member whose latest report contains `block_id`.
    pub fn locate(&self, block_id: &str) -> Vec<NodeAddr> {
        let datanodes = self.datanodes.read().unwrap();
        self.blocks
            .read()
            .unwrap()
            .iter()
            .filter(|(_, report)| report.iter().any(|block| block == block_id))
            .filter_map(|(datanode_id, _)| datanodes.get(datanode_id).cloned())
            .collect()
    }
}
