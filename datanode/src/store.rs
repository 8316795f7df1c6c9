//! On-disk block storage.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::info;

/// A flat directory of raw block files named by block id, plus the
/// in-memory id list the heartbeat reports from. Each block id is written
/// at most once, so writers never race on the same file.
pub struct BlockStore {
    blocks_dir: PathBuf,
    blocks: Mutex<Vec<String>>,
}

impl BlockStore {
    /// Opens `<root>/blocks`, creating it if needed and seeding the id
    /// list from whatever block files already exist.
    pub fn open(root: &Path) -> io::Result<Self> {
        let blocks_dir = root.join("blocks");
        fs::create_dir_all(&blocks_dir)?;
        let mut blocks = Vec::new();
        for entry in fs::read_dir(&blocks_dir)? {
            blocks.push(entry?.file_name().to_string_lossy().into_owned());
        }
        info!(dir = %blocks_dir.display(), blocks = blocks.len(), "opened block store");
        Ok(Self {
            blocks_dir,
            blocks: Mutex::new(blocks),
        })
    }

    /// The full list of block ids this node holds.
    pub fn block_report(&self) -> Vec<String> {
        self.blocks.lock().unwrap().clone()
    }

    pub fn has_block(&self, block_id: &str) -> bool {
        self.blocks.lock().unwrap().iter().any(|block| block == block_id)
    }

    pub async fn read_block(&self, block_id: &str) -> io::Result<Vec<u8>> {
        tokio::fs::read(self.block_path(block_id)).await
    }

    pub async fn add_block(&self, block_id: &str, bytes: &[u8]) -> io::Result<()> {
        tokio::fs::write(self.block_path(block_id), bytes).await?;
        self.blocks.lock().unwrap().push(block_id.to_string());
        Ok(())
    }

    fn block_path(&self, block_id: &str) -> PathBuf {
        self.blocks_dir.join(block_id)
    }
}
