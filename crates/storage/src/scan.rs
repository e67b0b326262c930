//! Local tree walking and hashing.
//!
//! The walk is an explicit stack of directories fed into an async stream, so
//! a caller can either consume entries as they are discovered or collect the
//! whole tree. Hashing is a separate step because the index strategy only
//! needs to hash a handful of files.

use crate::error::{ErrorKind, Result};
use crate::hash::ContentHash;
use crate::models::{DirectoryEntry, FileEntry, LocalFile, LocalInventory, LocalListing};
use crate::path::to_posix;
use async_stream::stream;
use futures::{Stream, StreamExt, TryStreamExt};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::fs::{self, DirEntry};
use tracing::instrument;

/// Files hashed at the same time. Hashing is I/O bound; a few in flight keeps
/// the disk busy without opening hundreds of descriptors.
const HASH_CONCURRENCY: usize = 8;

pub type EntryStream<'a> = Pin<Box<dyn Stream<Item = Result<Entry>> + Send + 'a>>;

/// One thing found under the tracked root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    File(LocalFile),
    Directory(DirectoryEntry),
    /// Ignored, a symlink, or a special file; relative path. Ignored
    /// directories are reported once and not descended into.
    Untracked(String),
}

enum WalkEntry {
    File(LocalFile),
    Descend(PathBuf, DirectoryEntry),
    Untracked(String),
}

/// Walks a tracked root. A path containing one of the ignore patterns as a
/// substring (`.git`, `.idea`, ...) is reported as untracked and not entered.
#[derive(Debug, Clone)]
pub struct Scanner {
    root: PathBuf,
    ignore: Vec<String>,
}
impl Scanner {
    pub fn new<I, S>(root: impl Into<PathBuf>, ignore: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { root: root.into(), ignore: ignore.into_iter().map(Into::into).collect() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_ignored(&self, path: &Path) -> bool {
        let path = path.to_string_lossy();
        self.ignore.iter().any(|pattern| !pattern.is_empty() && path.contains(pattern.as_str()))
    }

    async fn ensure_root(&self) -> Result<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| ErrorKind::from_io(e, &self.root))?;
        if !metadata.is_dir() {
            exn::bail!(ErrorKind::InvalidPath(self.root.clone()));
        }
        Ok(())
    }

    async fn process_entry(&self, entry: DirEntry) -> Result<WalkEntry> {
        let path = entry.path();
        let relative = to_posix(&self.root, &path)?;
        if self.is_ignored(&path) {
            return Ok(WalkEntry::Untracked(relative));
        }
        // DirEntry::metadata does not follow symlinks, so links are neither
        // files nor directories here and end up untracked below.
        let metadata = entry.metadata().await.map_err(|e| ErrorKind::from_io(e, &path))?;
        if metadata.is_dir() {
            return Ok(WalkEntry::Descend(path, DirectoryEntry::new(relative)));
        }
        if metadata.is_file() {
            return Ok(WalkEntry::File(LocalFile {
                path: relative,
                size: metadata.len(),
                ctime: ctime(&metadata),
                absolute: path,
            }));
        }
        tracing::debug!(path = %path.display(), "skipping special file");
        Ok(WalkEntry::Untracked(relative))
    }

    /// Stream every file, directory and untracked entry below the root (the
    /// root itself is not an entry). Fails immediately with
    /// [`NotFound`](ErrorKind::NotFound) if the root does not exist.
    pub fn walk(&self) -> EntryStream<'_> {
        Box::pin(stream! {
            if let Err(e) = self.ensure_root().await {
                yield Err(e);
                return;
            }
            let mut stack = vec![self.root.clone()];
            'dirs: while let Some(current) = stack.pop() {
                let mut entries = match fs::read_dir(&current).await {
                    Ok(entries) => entries,
                    Err(err) => {
                        yield Err(exn::Exn::from(ErrorKind::from_io(err, &current)));
                        continue 'dirs;
                    }
                };
                'entries: loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break 'entries,
                        Err(e) => { yield Err(exn::Exn::from(ErrorKind::from_io(e, &current))); continue 'entries; },
                    };
                    match self.process_entry(entry).await {
                        Ok(WalkEntry::File(f)) => yield Ok(Entry::File(f)),
                        Ok(WalkEntry::Descend(path, dir)) => {
                            stack.push(path);
                            yield Ok(Entry::Directory(dir));
                        },
                        Ok(WalkEntry::Untracked(path)) => yield Ok(Entry::Untracked(path)),
                        Err(e) => yield Err(e),
                    };
                }
            }
        })
    }

    /// Collect file metadata, directories and untracked paths without
    /// reading any content.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub async fn metadata(&self) -> Result<LocalListing> {
        let mut listing = LocalListing::default();
        let mut walk = self.walk();
        while let Some(entry) = walk.try_next().await? {
            match entry {
                Entry::File(file) => listing.files.push(file),
                Entry::Directory(dir) => listing.directories.push(dir),
                Entry::Untracked(path) => listing.untracked.push(path),
            }
        }
        listing.untracked.sort();
        Ok(listing)
    }

    /// Full inventory: every file hashed, every directory listed.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub async fn scan(&self) -> Result<LocalInventory> {
        let LocalListing { files, directories, .. } = self.metadata().await?;
        tracing::debug!(files = files.len(), directories = directories.len(), "hashing local files");
        let files = hash_all(files).await?;
        Ok(LocalInventory { files, directories }.sorted())
    }
}

async fn hash_one(file: LocalFile) -> Result<FileEntry> {
    let hash = ContentHash::of_file(&file.absolute).await?;
    Ok(FileEntry::new(file.path, hash))
}

/// Hash a set of local files, a few at a time. Output order is unspecified.
pub async fn hash_all(files: Vec<LocalFile>) -> Result<Vec<FileEntry>> {
    futures::stream::iter(files).map(hash_one).buffer_unordered(HASH_CONCURRENCY).try_collect().await
}

/// Status-change time in nanoseconds. POSIX only: elsewhere the modification
/// time is the best available stand-in, and a metadata-only change there will
/// not mark a file as dirty.
#[cfg(unix)]
pub fn ctime(metadata: &Metadata) -> i64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ctime().saturating_mul(1_000_000_000).saturating_add(metadata.ctime_nsec())
}

#[cfg(not(unix))]
pub fn ctime(metadata: &Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .and_then(|d| i64::try_from(d.as_nanos()).ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("journal/2024")).unwrap();
        std::fs::create_dir_all(root.join("empty")).unwrap();
        std::fs::create_dir_all(root.join(".git/objects")).unwrap();
        std::fs::write(root.join("todo.md"), b"- buy milk").unwrap();
        std::fs::write(root.join("journal/2024/jan.md"), b"cold").unwrap();
        std::fs::write(root.join(".git/HEAD"), b"ref: refs/heads/main").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_scan_lists_files_and_directories() {
        let dir = tree();
        let scanner = Scanner::new(dir.path(), [".git"]);
        let inventory = scanner.scan().await.unwrap();
        let files: Vec<_> = inventory.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(files, ["journal/2024/jan.md", "todo.md"]);
        let dirs: Vec<_> = inventory.directories.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(dirs, ["empty", "journal", "journal/2024"]);
        assert_eq!(inventory.files[1].hash, ContentHash::of(b"- buy milk"));
    }

    #[tokio::test]
    async fn test_ignore_is_substring_of_full_path() {
        let dir = tree();
        let scanner = Scanner::new(dir.path(), ["2024"]);
        let inventory = scanner.scan().await.unwrap();
        assert!(inventory.files.iter().all(|f| !f.path.contains("2024")));
        assert!(inventory.directories.iter().any(|d| d.path == "journal"));
        assert!(inventory.directories.iter().any(|d| d.path == ".git/objects"));
    }

    #[tokio::test]
    async fn test_hash_independent_of_location() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();
        std::fs::write(dir.path().join("a/one.md"), b"same").unwrap();
        std::fs::write(dir.path().join("two.md"), b"same").unwrap();
        let inventory = Scanner::new(dir.path(), Vec::<String>::new()).scan().await.unwrap();
        assert_eq!(inventory.files[0].hash, inventory.files[1].hash);
    }

    #[tokio::test]
    async fn test_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = Scanner::new(dir.path().join("nope"), Vec::<String>::new());
        let err = scanner.scan().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_metadata_does_not_hash() {
        let dir = tree();
        let listing = Scanner::new(dir.path(), [".git"]).metadata().await.unwrap();
        let todo = listing.files.iter().find(|f| f.path == "todo.md").unwrap();
        assert_eq!(todo.size, 10);
        assert_eq!(todo.absolute, dir.path().join("todo.md"));
        assert!(todo.ctime > 0);
    }

    #[tokio::test]
    async fn test_untracked_entries_are_listed_not_descended() {
        let dir = tree();
        std::fs::write(dir.path().join("journal/.git"), b"gitdir: elsewhere").unwrap();
        #[cfg(unix)]
        std::os::unix::fs::symlink(dir.path().join("todo.md"), dir.path().join("link.md")).unwrap();
        let listing = Scanner::new(dir.path(), [".git"]).metadata().await.unwrap();
        let mut expected = vec![".git", "journal/.git"];
        #[cfg(unix)]
        expected.push("link.md");
        assert_eq!(listing.untracked, expected);
        assert!(listing.files.iter().all(|f| f.path != "link.md"));
    }
}
