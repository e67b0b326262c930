use crate::models::IndexEntry;
use quill_storage::LocalFile;
use std::collections::{HashMap, HashSet};

/// How the tree on disk differs from what the index remembers.
///
/// `new`, `deleted` and `dirty` are sorted paths. Only `new` and `dirty`
/// files need to be read and hashed; `clean` entries carry the hash that was
/// recorded for them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexDelta {
    /// On disk, not in the index.
    pub new: Vec<String>,
    /// In the index, gone from disk.
    pub deleted: Vec<String>,
    /// In both, but `(ctime, size)` moved. The content may or may not have
    /// changed; only hashing can tell.
    pub dirty: Vec<String>,
    /// In both with identical `(ctime, size)`.
    pub clean: Vec<IndexEntry>,
}

impl IndexDelta {
    /// Paths that must be hashed to learn their current content hash.
    pub fn needs_hashing(&self) -> impl Iterator<Item = &str> {
        self.new.iter().chain(self.dirty.iter()).map(String::as_str)
    }
}

/// Compare the current filesystem metadata against cached index entries.
pub fn compare(cached: &[IndexEntry], current: &[LocalFile]) -> IndexDelta {
    let by_path: HashMap<&str, &IndexEntry> = cached.iter().map(|e| (e.path.as_str(), e)).collect();
    let mut delta = IndexDelta::default();
    for file in current {
        match by_path.get(file.path.as_str()) {
            None => delta.new.push(file.path.clone()),
            Some(entry) if entry.ctime == file.ctime && entry.size == file.size => delta.clean.push((*entry).clone()),
            Some(_) => delta.dirty.push(file.path.clone()),
        }
    }
    let on_disk: HashSet<&str> = current.iter().map(|f| f.path.as_str()).collect();
    delta.deleted = cached.iter().filter(|e| !on_disk.contains(e.path.as_str())).map(|e| e.path.clone()).collect();
    delta.new.sort();
    delta.dirty.sort();
    delta.deleted.sort();
    delta.clean.sort_by(|a, b| a.path.cmp(&b.path));
    delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_storage::ContentHash;
    use rstest::rstest;
    use std::path::PathBuf;

    fn cached(path: &str, ctime: i64, size: u64) -> IndexEntry {
        IndexEntry { path: path.to_string(), ctime, size, hash: ContentHash::of(path.as_bytes()) }
    }

    fn on_disk(path: &str, ctime: i64, size: u64) -> LocalFile {
        LocalFile { path: path.to_string(), absolute: PathBuf::from("/t").join(path), size, ctime }
    }

    #[test]
    fn test_compare_classifies_every_path() {
        let index = [
            cached("same.md", 10, 5),
            cached("touched.md", 10, 5),
            cached("grown.md", 10, 5),
            cached("gone.md", 1, 1),
        ];
        let disk = [
            on_disk("same.md", 10, 5),
            on_disk("touched.md", 11, 5),
            on_disk("grown.md", 10, 6),
            on_disk("new.md", 3, 3),
        ];
        let delta = compare(&index, &disk);
        assert_eq!(delta.new, ["new.md"]);
        assert_eq!(delta.deleted, ["gone.md"]);
        assert_eq!(delta.dirty, ["grown.md", "touched.md"]);
        assert_eq!(delta.clean, [cached("same.md", 10, 5)]);
        assert_eq!(delta.needs_hashing().collect::<Vec<_>>(), ["new.md", "grown.md", "touched.md"]);
    }

    #[rstest]
    #[case(&[], &[])]
    #[case(&[("a", 1, 1)], &[])]
    #[case(&[], &[("a", 1, 1)])]
    fn test_compare_empty_sides(#[case] index: &[(&str, i64, u64)], #[case] disk: &[(&str, i64, u64)]) {
        let index: Vec<_> = index.iter().map(|(p, c, s)| cached(p, *c, *s)).collect();
        let disk: Vec<_> = disk.iter().map(|(p, c, s)| on_disk(p, *c, *s)).collect();
        let delta = compare(&index, &disk);
        assert_eq!(delta.deleted.len(), index.len());
        assert_eq!(delta.new.len(), disk.len());
        assert!(delta.dirty.is_empty() && delta.clean.is_empty());
    }
}
