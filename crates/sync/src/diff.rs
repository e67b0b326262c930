//! Classification of two inventories against each other.
//!
//! Equal hashes mean equal content; there is no byte-level verification.

use quill_storage::{DirectoryEntry, FileEntry};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Every path of both sides, in exactly one of four sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileClassification {
    pub remote_only: BTreeSet<String>,
    pub local_only: BTreeSet<String>,
    pub unchanged: BTreeSet<String>,
    /// On both sides with different hashes.
    pub altered: BTreeSet<String>,
}

impl FileClassification {
    /// `true` when both sides already hold the same files.
    pub fn is_empty_change(&self) -> bool {
        self.remote_only.is_empty() && self.local_only.is_empty() && self.altered.is_empty()
    }
}

impl fmt::Display for FileClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} remote only, {} local only, {} altered, {} unchanged",
            self.remote_only.len(),
            self.local_only.len(),
            self.altered.len(),
            self.unchanged.len()
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryClassification {
    pub remote_only: BTreeSet<String>,
    pub local_only: BTreeSet<String>,
    pub both: BTreeSet<String>,
}

impl DirectoryClassification {
    pub fn is_empty_change(&self) -> bool {
        self.remote_only.is_empty() && self.local_only.is_empty()
    }
}

impl fmt::Display for DirectoryClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} remote only, {} local only, {} on both sides",
            self.remote_only.len(),
            self.local_only.len(),
            self.both.len()
        )
    }
}

pub fn classify_files(remote: &[FileEntry], local: &[FileEntry]) -> FileClassification {
    let remote: BTreeMap<&str, _> = remote.iter().map(|e| (e.path.as_str(), e.hash)).collect();
    let local: BTreeMap<&str, _> = local.iter().map(|e| (e.path.as_str(), e.hash)).collect();
    let mut result = FileClassification::default();
    for (path, hash) in &remote {
        match local.get(path) {
            None => _ = result.remote_only.insert(path.to_string()),
            Some(other) if other == hash => _ = result.unchanged.insert(path.to_string()),
            Some(_) => _ = result.altered.insert(path.to_string()),
        }
    }
    result.local_only = local.keys().filter(|path| !remote.contains_key(*path)).map(|p| p.to_string()).collect();
    result
}

pub fn classify_directories(remote: &[DirectoryEntry], local: &[DirectoryEntry]) -> DirectoryClassification {
    let remote: BTreeSet<&str> = remote.iter().map(|d| d.path.as_str()).collect();
    let local: BTreeSet<&str> = local.iter().map(|d| d.path.as_str()).collect();
    DirectoryClassification {
        remote_only: remote.difference(&local).map(|p| p.to_string()).collect(),
        local_only: local.difference(&remote).map(|p| p.to_string()).collect(),
        both: remote.intersection(&local).map(|p| p.to_string()).collect(),
    }
}
