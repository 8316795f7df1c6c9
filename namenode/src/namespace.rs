//! The namespace engine.
//!
//! The whole tree lives in a fixed arena of inode slots with a parallel
//! occupancy bitmap: directories reference their children by slot index, so
//! the structure is contiguous, cycle-free, and snapshots to disk as a
//! single encoded blob (the fsimage). Freeing a subtree only clears bitmap
//! bits; dead slots keep their garbage contents until reallocated.
//!
//! The engine is not internally synchronized. The request handler serializes
//! mutations under one exclusive lock spanning the operation and the
//! fsimage rewrite that follows it.

use std::fs;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Slot of the root directory. The root is allocated first into a fresh
/// table and is never freed, so it always lives here.
pub const ROOT_SLOT: usize = 0;

#[derive(Error, Debug)]
pub enum NamespaceError {
    #[error("must specify an absolute path")]
    RelativePath,
    #[error("trailing slash: {0}")]
    TrailingSlash(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("is a directory: {0}")]
    IsADirectory(String),
    #[error("not a file: {0}")]
    NotAFile(String),
    #[error("already in directory: {0}")]
    AlreadyExists(String),
    #[error("cannot allocate inode: bitmap full")]
    TableFull,
    #[error("failed to persist fsimage: {0}")]
    Io(#[from] io::Error),
    #[error("failed to encode fsimage: {0}")]
    Encode(#[from] bincode::Error),
}

/// A single namespace entry. Directories hold `(slot, name)` child pairs in
/// creation order; files hold the id of their one block, fixed for the
/// inode's lifetime.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum Inode {
    Directory {
        name: String,
        children: Vec<(usize, String)>,
    },
    File {
        name: String,
        block_id: String,
    },
}

impl Inode {
    fn name(&self) -> &str {
        match self {
            Inode::Directory { name, .. } | Inode::File { name, .. } => name,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self, Inode::Directory { .. })
    }
}

/// The inode table, its occupancy bitmap, and the fsimage location they are
/// snapshotted to after every successful mutation.
#[derive(Serialize, Deserialize)]
pub struct Namespace {
    table: Vec<Inode>,
    bitmap: Vec<bool>,
    #[serde(skip)]
    fsimage_path: PathBuf,
}

impl Namespace {
    /// Reconstitutes the namespace from an existing fsimage, or builds a
    /// fresh tree holding only the root directory.
    pub fn load_or_create(fsimage_path: PathBuf, capacity: usize) -> Result<Self, NamespaceError> {
        match fs::read(&fsimage_path) {
            Ok(encoded) => {
                let mut namespace: Namespace = bincode::deserialize(&encoded)?;
                namespace.fsimage_path = fsimage_path;
                info!(
                    path = %namespace.fsimage_path.display(),
                    occupied = namespace.occupied_count(),
                    "loaded fsimage"
                );
                Ok(namespace)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let garbage = Inode::File {
                    name: String::new(),
                    block_id: String::new(),
                };
                let mut namespace = Namespace {
                    table: vec![garbage; capacity],
                    bitmap: vec![false; capacity],
                    fsimage_path,
                };
                namespace.allocate(Inode::Directory {
                    name: "/".to_string(),
                    children: Vec::new(),
                })?;
                info!(path = %namespace.fsimage_path.display(), "created fresh namespace");
                Ok(namespace)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Lists a directory as `(name, kind)` pairs in creation order, with
    /// kind `"f"` or `"d"`.
    pub fn list(&self, path: &str) -> Result<Vec<(String, String)>, NamespaceError> {
        let components = split_path(path)?;
        let slot = self.resolve(&components)?;
        match &self.table[slot] {
            Inode::Directory { children, .. } => Ok(children
                .iter()
                .map(|(child, name)| {
                    let kind = if self.table[*child].is_dir() { "d" } else { "f" };
                    (name.clone(), kind.to_string())
                })
                .collect()),
            Inode::File { name, .. } => Err(NamespaceError::NotADirectory(name.clone())),
        }
    }

    /// Returns the block id of the file at `path`.
    pub fn lookup_block(&self, path: &str) -> Result<String, NamespaceError> {
        let components = split_path(path)?;
        let slot = self.resolve(&components)?;
        match &self.table[slot] {
            Inode::File { block_id, .. } => Ok(block_id.clone()),
            Inode::Directory { .. } => Err(NamespaceError::IsADirectory(path.to_string())),
        }
    }

    pub fn mkdir(&mut self, path: &str) -> Result<(), NamespaceError> {
        let slot = self.create(path, |name| Inode::Directory {
            name,
            children: Vec::new(),
        })?;
        debug!(path, slot, "mkdir");
        self.snapshot()
    }

    /// Creates a file inode and returns its freshly minted block id.
    pub fn mkfile(&mut self, path: &str) -> Result<String, NamespaceError> {
        let block_id = Uuid::new_v4().to_string();
        let assigned = block_id.clone();
        let slot = self.create(path, move |name| Inode::File { name, block_id })?;
        debug!(path, slot, block_id = %assigned, "mkfile");
        self.snapshot()?;
        Ok(assigned)
    }

    /// Removes a directory and everything beneath it.
    pub fn rmdir(&mut self, path: &str) -> Result<(), NamespaceError> {
        self.remove(path, true)?;
        debug!(path, "rmdir");
        self.snapshot()
    }

    /// Removes a file inode and returns the block id it carried. The block
    /// bytes on data nodes are untouched.
    pub fn rmfile(&mut self, path: &str) -> Result<String, NamespaceError> {
        let removed = self.remove(path, false)?;
        let block_id = match removed {
            Inode::File { block_id, .. } => block_id,
            Inode::Directory { .. } => return Err(NamespaceError::NotAFile(path.to_string())),
        };
        debug!(path, block_id = %block_id, "rmfile");
        self.snapshot()?;
        Ok(block_id)
    }

    /// Number of occupied slots, root included.
    pub fn occupied_count(&self) -> usize {
        self.bitmap.iter().filter(|occupied| **occupied).count()
    }

    /// Walks `components` from the root. Stepping through a file fails, as
    /// does any missing component.
    fn resolve(&self, components: &[&str]) -> Result<usize, NamespaceError> {
        let mut slot = ROOT_SLOT;
        for component in components {
            let children = match &self.table[slot] {
                Inode::Directory { children, .. } => children,
                Inode::File { name, .. } => {
                    return Err(NamespaceError::NotADirectory(name.clone()));
                }
            };
            slot = children
                .iter()
                .find(|(_, name)| name.as_str() == *component)
                .map(|(child, _)| *child)
                .ok_or_else(|| NamespaceError::NotFound((*component).to_string()))?;
        }
        Ok(slot)
    }

    /// Resolves `components` and requires the result to be a directory.
    fn resolve_dir(&self, components: &[&str]) -> Result<usize, NamespaceError> {
        let slot = self.resolve(components)?;
        match &self.table[slot] {
            Inode::Directory { .. } => Ok(slot),
            Inode::File { name, .. } => Err(NamespaceError::NotADirectory(name.clone())),
        }
    }

    fn child_slot(&self, dir: usize, name: &str) -> Option<usize> {
        match &self.table[dir] {
            Inode::Directory { children, .. } => children
                .iter()
                .find(|(_, child_name)| child_name.as_str() == name)
                .map(|(child, _)| *child),
            Inode::File { .. } => None,
        }
    }

    /// Shared creation path: resolve the parent as a directory, reject a
    /// duplicate leaf name, allocate a slot, and link it. The duplicate
    /// check precedes allocation so a failure leaves the table untouched.
    fn create(
        &mut self,
        path: &str,
        build: impl FnOnce(String) -> Inode,
    ) -> Result<usize, NamespaceError> {
        let components = split_path(path)?;
        let Some((leaf, parents)) = components.split_last() else {
            return Err(NamespaceError::AlreadyExists("/".to_string()));
        };
        let parent = self.resolve_dir(parents)?;
        if self.child_slot(parent, leaf).is_some() {
            return Err(NamespaceError::AlreadyExists((*leaf).to_string()));
        }
        let slot = self.allocate(build((*leaf).to_string()))?;
        if let Inode::Directory { children, .. } = &mut self.table[parent] {
            children.push((slot, (*leaf).to_string()));
        }
        Ok(slot)
    }

    /// Shared removal path: detach the leaf from its parent, then free the
    /// subtree. Returns the detached inode.
    fn remove(&mut self, path: &str, expect_dir: bool) -> Result<Inode, NamespaceError> {
        let components = split_path(path)?;
        let Some((leaf, parents)) = components.split_last() else {
            return Err(NamespaceError::NotFound("/".to_string()));
        };
        let parent = self.resolve_dir(parents)?;
        let slot = self
            .child_slot(parent, leaf)
            .ok_or_else(|| NamespaceError::NotFound((*leaf).to_string()))?;
        match (&self.table[slot], expect_dir) {
            (Inode::File { .. }, true) => {
                return Err(NamespaceError::NotADirectory((*leaf).to_string()));
            }
            (Inode::Directory { .. }, false) => {
                return Err(NamespaceError::NotAFile((*leaf).to_string()));
            }
            _ => {}
        }
        if let Inode::Directory { children, .. } = &mut self.table[parent] {
            children.retain(|(child, _)| *child != slot);
        }
        self.free_subtree(slot);
        Ok(self.table[slot].clone())
    }

    /// First-free scan over the occupancy bitmap.
    fn allocate(&mut self, inode: Inode) -> Result<usize, NamespaceError> {
        let slot = self
            .bitmap
            .iter()
            .position(|occupied| !occupied)
            .ok_or(NamespaceError::TableFull)?;
        self.table[slot] = inode;
        self.bitmap[slot] = true;
        Ok(slot)
    }

    /// Clears the bitmap bit of `slot` and of everything reachable from it.
    /// A clear bit alone marks a slot dead; its contents stay as garbage.
    fn free_subtree(&mut self, slot: usize) {
        let mut worklist = vec![slot];
        while let Some(current) = worklist.pop() {
            self.bitmap[current] = false;
            if let Inode::Directory { children, .. } = &self.table[current] {
                worklist.extend(children.iter().map(|(child, _)| *child));
            }
        }
    }

    /// Rewrites the fsimage: encode the full state, write it to a sibling
    /// temporary file, rename over the live image.
    fn snapshot(&self) -> Result<(), NamespaceError> {
        let encoded = bincode::serialize(self)?;
        let tmp = self.fsimage_path.with_extension("tmp");
        fs::write(&tmp, &encoded)?;
        fs::rename(&tmp, &self.fsimage_path)?;
        debug!(path = %self.fsimage_path.display(), bytes = encoded.len(), "persisted fsimage");
        Ok(())
    }
}

/// Validates an absolute path and splits it into its non-empty components.
/// `"/"` yields no components at all.
fn split_path(path: &str) -> Result<Vec<&str>, NamespaceError> {
    if !path.starts_with('/') {
        return Err(NamespaceError::RelativePath);
    }
    if path.len() > 1 && path.ends_with('/') {
        return Err(NamespaceError::TrailingSlash(path.to_string()));
    }
    Ok(path
        .split('/')
        .filter(|component| !component.is_empty())
        .collect())
}
