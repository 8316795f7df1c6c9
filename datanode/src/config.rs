//! The data node's persisted identity.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use common::message::NodeAddr;
use common::settings::ClusterSettings;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

pub const CONFIG_FILENAME: &str = "hdfs_config.json";

/// Identity and addressing persisted as JSON at `<root>/hdfs_config.json`.
/// The datanode id is minted once on first start; the namespace id is
/// learned from the cluster's handshake reply. Together they form the
/// node's cluster identity, and both survive restarts.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NodeConfig {
    pub software_version: String,
    pub datanode_id: String,
    pub namespace_id: Option<String>,
    pub namenode_addr: NodeAddr,
    pub listen_addr: NodeAddr,
}

impl NodeConfig {
    /// Loads the persisted config, or synthesizes a fresh identity for a
    /// node that has never joined a cluster.
    pub fn load_or_default(
        root: &Path,
        port: u16,
        settings: &ClusterSettings,
    ) -> anyhow::Result<Self> {
        let path = Self::path(root);
        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let config: NodeConfig = serde_json::from_str(&contents)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            info!(path = %path.display(), datanode_id = %config.datanode_id, "loaded config");
            Ok(config)
        } else {
            info!("no config found, using defaults");
            Ok(Self {
                software_version: settings.software_version.clone(),
                datanode_id: Uuid::new_v4().to_string(),
                namespace_id: None,
                namenode_addr: settings.namenode_addr.clone(),
                listen_addr: ("localhost".to_string(), port),
            })
        }
    }

    pub fn persist(&self, root: &Path) -> anyhow::Result<()> {
        let path = Self::path(root);
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(&path, contents).with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), "persisted config");
        Ok(())
    }

    fn path(root: &Path) -> PathBuf {
        root.join(CONFIG_FILENAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn a_fresh_node_has_no_namespace_id() {
        let dir = tempdir().expect("failed to create tempdir");
        let settings = ClusterSettings::default();
        let config = NodeConfig::load_or_default(dir.path(), 4000, &settings)
            .expect("failed to build config");

        assert_eq!(config.software_version, "1.0.0");
        assert!(config.namespace_id.is_none());
        assert_eq!(config.listen_addr, ("localhost".to_string(), 4000));
    }

    #[test]
    fn identity_survives_a_restart() {
        let dir = tempdir().expect("failed to create tempdir");
        let settings = ClusterSettings::default();
        let mut config = NodeConfig::load_or_default(dir.path(), 4000, &settings)
            .expect("failed to build config");
        config.namespace_id = Some("pythonhdfs3143".to_string());
        config.persist(dir.path()).expect("failed to persist");

        let reloaded = NodeConfig::load_or_default(dir.path(), 9999, &settings)
            .expect("failed to reload config");
        assert_eq!(reloaded.datanode_id, config.datanode_id);
        assert_eq!(reloaded.namespace_id.as_deref(), Some("pythonhdfs3143"));
        // the persisted listen address wins over the command line
        assert_eq!(reloaded.listen_addr, ("localhost".to_string(), 4000));
    }
}
