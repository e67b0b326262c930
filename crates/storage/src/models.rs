//! Inventory types shared by both sides of a sync.
//!
//! Paths are always relative to the tracked root, `/`-separated, and unique
//! per side. The remote store hands back the exact same [`FileEntry`] and
//! [`DirectoryEntry`] types, which is what lets the differ compare them.

use crate::hash::ContentHash;
use std::path::PathBuf;

/// A tracked file: relative path plus content hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileEntry {
    pub path: String,
    pub hash: ContentHash,
}
impl FileEntry {
    pub fn new(path: impl Into<String>, hash: ContentHash) -> Self {
        Self { path: path.into(), hash }
    }
}

/// A tracked directory. No hash; identity is the path alone, and an empty
/// directory still has an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DirectoryEntry {
    pub path: String,
}
impl DirectoryEntry {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// Filesystem metadata for a local file, gathered without reading it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    /// Relative, `/`-separated.
    pub path: String,
    pub absolute: PathBuf,
    pub size: u64,
    /// Status-change time in nanoseconds since the Unix epoch. Falls back to
    /// the modification time on platforms without a ctime.
    pub ctime: i64,
}

/// Everything found under the tracked root on one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalInventory {
    pub files: Vec<FileEntry>,
    pub directories: Vec<DirectoryEntry>,
}
impl LocalInventory {
    /// Sort both lists by path so that two inventories of the same tree
    /// compare equal regardless of traversal or hashing order.
    pub fn sorted(mut self) -> Self {
        self.files.sort();
        self.directories.sort();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.directories.is_empty()
    }
}

/// One metadata-only pass over the tracked root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalListing {
    pub files: Vec<LocalFile>,
    pub directories: Vec<DirectoryEntry>,
    /// Ignored paths, symlinks and special files, relative and sorted. They
    /// are never synced and never descended into, but they are still part of
    /// the tree on disk.
    pub untracked: Vec<String>,
}
