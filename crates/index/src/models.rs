use crate::error::{Error, ErrorKind};
use exn::{OptionExt, ResultExt};
use quill_storage::ContentHash;
use time::UtcDateTime;

/// What the index remembers about one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub path: String,
    pub ctime: i64,
    pub size: u64,
    pub hash: ContentHash,
}

/// One entry of the index commit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub version: u64,
    pub committed_at: UtcDateTime,
    pub message: String,
}

#[derive(sqlx::FromRow)]
pub(crate) struct EntryRow {
    pub(crate) path: String,
    pub(crate) ctime: i64,
    pub(crate) size: i64,
    pub(crate) hash: Vec<u8>,
}
impl TryFrom<&IndexEntry> for EntryRow {
    type Error = Error;
    fn try_from(entry: &IndexEntry) -> Result<Self, Self::Error> {
        Ok(Self {
            path: entry.path.clone(),
            ctime: entry.ctime,
            size: i64::try_from(entry.size).or_raise(|| ErrorKind::InvalidData("file size"))?,
            hash: entry.hash.to_bytes().to_vec(),
        })
    }
}
impl TryFrom<EntryRow> for IndexEntry {
    type Error = Error;
    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            path: row.path,
            ctime: row.ctime,
            size: u64::try_from(row.size).or_raise(|| ErrorKind::InvalidData("file size"))?,
            hash: ContentHash::from_bytes(&row.hash).ok_or_raise(|| ErrorKind::InvalidData("content hash"))?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct CommitRow {
    pub(crate) version: i64,
    pub(crate) committed_at: i64,
    pub(crate) message: String,
}
impl TryFrom<CommitRow> for Commit {
    type Error = Error;
    fn try_from(row: CommitRow) -> Result<Self, Self::Error> {
        Ok(Self {
            version: u64::try_from(row.version).or_raise(|| ErrorKind::InvalidData("version"))?,
            committed_at: UtcDateTime::from_unix_timestamp(row.committed_at)
                .or_raise(|| ErrorKind::InvalidData("commit date"))?,
            message: row.message,
        })
    }
}
