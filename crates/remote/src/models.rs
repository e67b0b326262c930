//! Records stored remotely, and their row shapes.
//!
//! Instants are stored as milliseconds since the Unix epoch and hashes as
//! 8 big-endian bytes.

use crate::error::{Error, ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use quill_storage::{ContentHash, DirectoryEntry, FileEntry};
use time::UtcDateTime;

pub(crate) fn to_millis(at: UtcDateTime) -> Result<i64> {
    i64::try_from(at.unix_timestamp_nanos() / 1_000_000).or_raise(|| ErrorKind::InvalidData("timestamp"))
}

pub(crate) fn from_millis(millis: i64) -> Result<UtcDateTime> {
    UtcDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .or_raise(|| ErrorKind::InvalidData("timestamp"))
}

fn hash(bytes: &[u8]) -> Result<ContentHash> {
    ContentHash::from_bytes(bytes).ok_or_raise(|| ErrorKind::InvalidData("content hash"))
}

/// Content to be written to the store for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub path: String,
    pub content: Vec<u8>,
    pub hash: ContentHash,
}
impl Upload {
    pub fn new(path: impl Into<String>, content: Vec<u8>) -> Self {
        let hash = ContentHash::of(&content);
        Self { path: path.into(), content, hash }
    }
}

/// Content as read back from the store, either current or as of an instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub path: String,
    pub content: Vec<u8>,
    pub hash: ContentHash,
}

/// A live record with its full metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub id: i64,
    pub path: String,
    pub content: Vec<u8>,
    pub hash: ContentHash,
    pub origin_at: UtcDateTime,
    pub last_edit_at: UtcDateTime,
}

/// A superseded version of a live record, valid over `[valid_from, valid_to)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    pub id: i64,
    pub record_id: i64,
    pub content: Vec<u8>,
    pub hash: ContentHash,
    pub valid_from: UtcDateTime,
    pub valid_to: UtcDateTime,
}

/// A deleted record, as it was at the moment of deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedRecord {
    pub id: i64,
    pub record_id: i64,
    pub path: String,
    pub content: Vec<u8>,
    pub hash: ContentHash,
    pub origin_at: UtcDateTime,
    pub deleted_at: UtcDateTime,
}

/// A superseded version of a deleted record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadDelta {
    pub id: i64,
    pub deleted_id: i64,
    pub record_id: i64,
    pub content: Vec<u8>,
    pub hash: ContentHash,
    pub valid_from: UtcDateTime,
    pub valid_to: UtcDateTime,
}

#[derive(sqlx::FromRow)]
pub(crate) struct FileRow {
    pub(crate) path: String,
    pub(crate) hash: Vec<u8>,
}
impl TryFrom<FileRow> for FileEntry {
    type Error = Error;
    fn try_from(row: FileRow) -> Result<Self> {
        Ok(FileEntry::new(row.path, hash(&row.hash)?))
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct DirectoryRow {
    pub(crate) path: String,
}
impl From<DirectoryRow> for DirectoryEntry {
    fn from(row: DirectoryRow) -> Self {
        DirectoryEntry::new(row.path)
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ContentRow {
    pub(crate) path: String,
    pub(crate) content: Vec<u8>,
    pub(crate) hash: Vec<u8>,
}
impl TryFrom<ContentRow> for Download {
    type Error = Error;
    fn try_from(row: ContentRow) -> Result<Self> {
        Ok(Self { hash: hash(&row.hash)?, path: row.path, content: row.content })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct RecordRow {
    pub(crate) id: i64,
    pub(crate) path: String,
    pub(crate) content: Vec<u8>,
    pub(crate) hash: Vec<u8>,
    pub(crate) origin_at: i64,
    pub(crate) last_edit_at: i64,
}
impl TryFrom<RecordRow> for StoredRecord {
    type Error = Error;
    fn try_from(row: RecordRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            hash: hash(&row.hash)?,
            path: row.path,
            content: row.content,
            origin_at: from_millis(row.origin_at)?,
            last_edit_at: from_millis(row.last_edit_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct DeltaRow {
    pub(crate) id: i64,
    pub(crate) note_id: i64,
    pub(crate) content: Vec<u8>,
    pub(crate) hash: Vec<u8>,
    pub(crate) valid_from: i64,
    pub(crate) valid_to: i64,
}
impl TryFrom<DeltaRow> for Delta {
    type Error = Error;
    fn try_from(row: DeltaRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            record_id: row.note_id,
            hash: hash(&row.hash)?,
            content: row.content,
            valid_from: from_millis(row.valid_from)?,
            valid_to: from_millis(row.valid_to)?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct DeletedRow {
    pub(crate) id: i64,
    pub(crate) note_id: i64,
    pub(crate) path: String,
    pub(crate) content: Vec<u8>,
    pub(crate) hash: Vec<u8>,
    pub(crate) origin_at: i64,
    pub(crate) deleted_at: i64,
}
impl TryFrom<DeletedRow> for DeletedRecord {
    type Error = Error;
    fn try_from(row: DeletedRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            record_id: row.note_id,
            hash: hash(&row.hash)?,
            path: row.path,
            content: row.content,
            origin_at: from_millis(row.origin_at)?,
            deleted_at: from_millis(row.deleted_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct DeadDeltaRow {
    pub(crate) id: i64,
    pub(crate) deleted_id: i64,
    pub(crate) note_id: i64,
    pub(crate) content: Vec<u8>,
    pub(crate) hash: Vec<u8>,
    pub(crate) valid_from: i64,
    pub(crate) valid_to: i64,
}
impl TryFrom<DeadDeltaRow> for DeadDelta {
    type Error = Error;
    fn try_from(row: DeadDeltaRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            deleted_id: row.deleted_id,
            record_id: row.note_id,
            hash: hash(&row.hash)?,
            content: row.content,
            valid_from: from_millis(row.valid_from)?,
            valid_to: from_millis(row.valid_to)?,
        })
    }
}
