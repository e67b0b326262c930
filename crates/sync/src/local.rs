//! Strategies for learning what the local tree holds.
//!
//! [`ScanState`] hashes every file on every run. [`IndexedState`] asks the
//! local index which files changed since it was last written and hashes only
//! those. Both must report the same inventory for the same tree.

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use quill_index::{IndexEntry, Repository};
use quill_storage::{ContentHash, FileEntry, LocalFile, LocalInventory, LocalListing, Scanner, hash_all};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::instrument;

/// The local tree as one run sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalTree {
    pub inventory: LocalInventory,
    /// Metadata for every file in `inventory`, sorted by path.
    pub files: Vec<LocalFile>,
    /// Entries on disk that are never synced (ignored paths, symlinks).
    pub untracked: Vec<String>,
}

impl LocalTree {
    fn new(files: Vec<FileEntry>, listing: LocalListing) -> Self {
        let LocalListing { files: mut metadata, directories, untracked } = listing;
        metadata.sort_by(|a, b| a.path.cmp(&b.path));
        Self { inventory: LocalInventory { files, directories }.sorted(), files: metadata, untracked }
    }

    /// Metadata for `path`.
    pub fn file(&self, path: &str) -> Option<&LocalFile> {
        self.files.binary_search_by(|f| f.path.as_str().cmp(path)).ok().map(|i| &self.files[i])
    }

    /// Metadata for each of `paths` that exists locally, in the given order.
    pub fn select<'a>(&self, paths: impl IntoIterator<Item = &'a String>) -> Vec<LocalFile> {
        paths.into_iter().filter_map(|p| self.file(p)).cloned().collect()
    }
}

#[async_trait]
pub trait LocalState: Send + Sync {
    /// The tracked root.
    fn root(&self) -> &Path;

    /// Inventory of the tracked root.
    async fn load(&self) -> Result<LocalTree>;

    /// The tree now holds exactly `files`; remember that if this strategy
    /// keeps state. Returns the new index version, if any.
    async fn refresh(&self, files: &[FileEntry], message: &str) -> Result<Option<u64>>;

    /// Rebuild any kept state from a full scan.
    async fn rebuild(&self, message: &str) -> Result<Option<u64>>;
}

async fn full_scan(scanner: &Scanner) -> Result<LocalTree> {
    let listing = scanner.metadata().await.or_raise(|| ErrorKind::Filesystem)?;
    let hashed = hash_all(listing.files.clone()).await.or_raise(|| ErrorKind::Filesystem)?;
    Ok(LocalTree::new(hashed, listing))
}

/// Hash everything, keep nothing.
#[derive(Debug, Clone)]
pub struct ScanState {
    scanner: Scanner,
}

impl ScanState {
    pub fn new(scanner: Scanner) -> Self {
        Self { scanner }
    }
}

#[async_trait]
impl LocalState for ScanState {
    fn root(&self) -> &Path {
        self.scanner.root()
    }

    #[instrument(skip(self), fields(root = %self.root().display()))]
    async fn load(&self) -> Result<LocalTree> {
        full_scan(&self.scanner).await
    }

    async fn refresh(&self, _files: &[FileEntry], _message: &str) -> Result<Option<u64>> {
        Ok(None)
    }

    async fn rebuild(&self, _message: &str) -> Result<Option<u64>> {
        Ok(None)
    }
}

/// Hash only what the local index cannot vouch for.
#[derive(Debug, Clone)]
pub struct IndexedState {
    scanner: Scanner,
    index: Repository,
}

impl IndexedState {
    pub fn new(scanner: Scanner, index: Repository) -> Self {
        Self { scanner, index }
    }

    async fn record(&self, tree: &LocalTree, message: &str) -> Result<u64> {
        let hashes: HashMap<&str, ContentHash> =
            tree.inventory.files.iter().map(|f| (f.path.as_str(), f.hash)).collect();
        let entries: Vec<IndexEntry> = tree
            .files
            .iter()
            .filter_map(|f| {
                let hash = *hashes.get(f.path.as_str())?;
                Some(IndexEntry { path: f.path.clone(), ctime: f.ctime, size: f.size, hash })
            })
            .collect();
        self.index.record(&entries, message).await.or_raise(|| ErrorKind::Index)
    }
}

#[async_trait]
impl LocalState for IndexedState {
    fn root(&self) -> &Path {
        self.scanner.root()
    }

    #[instrument(skip(self), fields(root = %self.root().display()))]
    async fn load(&self) -> Result<LocalTree> {
        let listing = self.scanner.metadata().await.or_raise(|| ErrorKind::Filesystem)?;
        let delta = self.index.query(&listing.files).await.or_raise(|| ErrorKind::Index)?;
        tracing::debug!(
            new = delta.new.len(),
            dirty = delta.dirty.len(),
            deleted = delta.deleted.len(),
            clean = delta.clean.len(),
            "index compared"
        );
        let stale: HashSet<&str> = delta.needs_hashing().collect();
        let to_hash: Vec<LocalFile> =
            listing.files.iter().filter(|f| stale.contains(f.path.as_str())).cloned().collect();
        let mut hashed = hash_all(to_hash).await.or_raise(|| ErrorKind::Filesystem)?;
        hashed.extend(delta.clean.into_iter().map(|e| FileEntry::new(e.path, e.hash)));
        Ok(LocalTree::new(hashed, listing))
    }

    /// Re-read metadata, since rewriting the tree moved every ctime, and
    /// pair it with the known hashes. Anything unexpected is hashed.
    #[instrument(skip(self, files))]
    async fn refresh(&self, files: &[FileEntry], message: &str) -> Result<Option<u64>> {
        let listing = self.scanner.metadata().await.or_raise(|| ErrorKind::Filesystem)?;
        let known: HashMap<&str, ContentHash> = files.iter().map(|f| (f.path.as_str(), f.hash)).collect();
        let mut entries = Vec::with_capacity(listing.files.len());
        let mut unknown = Vec::new();
        for file in &listing.files {
            match known.get(file.path.as_str()) {
                Some(hash) => entries.push(FileEntry::new(file.path.clone(), *hash)),
                None => unknown.push(file.clone()),
            }
        }
        if !unknown.is_empty() {
            tracing::debug!(files = unknown.len(), "hashing files missing from the refresh list");
            entries.extend(hash_all(unknown).await.or_raise(|| ErrorKind::Filesystem)?);
        }
        let tree = LocalTree::new(entries, listing);
        self.record(&tree, message).await.map(Some)
    }

    async fn rebuild(&self, message: &str) -> Result<Option<u64>> {
        let tree = full_scan(&self.scanner).await?;
        self.record(&tree, message).await.map(Some)
    }
}
