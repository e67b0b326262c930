//! Reads and writes against the local index.

use crate::Database;
use crate::compare::{IndexDelta, compare};
use crate::error::{ErrorKind, Result};
use crate::models::{Commit, CommitRow, EntryRow, IndexEntry};
use exn::ResultExt;
use quill_storage::LocalFile;
use sqlx::SqlitePool;
use time::UtcDateTime;
use tracing::instrument;

/// Repository over the `files` and `commits` tables.
///
/// The file table is only ever replaced wholesale: the index describes one
/// moment at which the local tree was known to match the remote store, and
/// mixing rows from two such moments would make the cached hashes lie.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}
impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Write
    // =========================================================================

    /// Replace the indexed state with `entries` and append a commit.
    ///
    /// Both happen in one transaction. Returns the new version, which is
    /// always one more than the previous one (the first commit is version 1).
    #[instrument(skip(self, entries), fields(entries = entries.len()))]
    pub async fn record(&self, entries: &[IndexEntry], message: &str) -> Result<u64> {
        let rows = entries.iter().map(EntryRow::try_from).collect::<Result<Vec<_>>>()?;
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        sqlx::query(include_str!("../queries/clear_files.sql"))
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        for row in rows {
            sqlx::query(include_str!("../queries/insert_file.sql"))
                .bind(row.path)
                .bind(row.ctime)
                .bind(row.size)
                .bind(row.hash)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        let previous: i64 = sqlx::query_scalar(include_str!("../queries/current_version.sql"))
            .fetch_one(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let version = previous + 1;
        sqlx::query(include_str!("../queries/insert_commit.sql"))
            .bind(version)
            .bind(UtcDateTime::now().unix_timestamp())
            .bind(message)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        tracing::debug!(version, "index committed");
        u64::try_from(version).or_raise(|| ErrorKind::InvalidData("version"))
    }

    // =========================================================================
    // Read
    // =========================================================================

    /// Current version; `0` before the first commit.
    pub async fn version(&self) -> Result<u64> {
        let version: i64 = sqlx::query_scalar(include_str!("../queries/current_version.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(version).or_raise(|| ErrorKind::InvalidData("version"))
    }

    /// Most recent commits first.
    pub async fn log(&self, limit: usize) -> Result<Vec<Commit>> {
        let limit = i64::try_from(limit).or_raise(|| ErrorKind::InvalidData("limit"))?;
        let rows: Vec<CommitRow> = sqlx::query_as(include_str!("../queries/list_commits.sql"))
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Commit::try_from).collect()
    }

    /// Every indexed file, sorted by path.
    pub async fn list(&self) -> Result<Vec<IndexEntry>> {
        let rows: Vec<EntryRow> = sqlx::query_as(include_str!("../queries/list_files.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(IndexEntry::try_from).collect()
    }

    /// Compare current filesystem metadata against the index.
    pub async fn query(&self, current: &[LocalFile]) -> Result<IndexDelta> {
        let cached = self.list().await?;
        Ok(compare(&cached, current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_storage::ContentHash;
    use std::path::PathBuf;

    fn entry(path: &str, ctime: i64) -> IndexEntry {
        IndexEntry { path: path.to_string(), ctime, size: 3, hash: ContentHash::of(path.as_bytes()) }
    }

    async fn repo() -> (Database, Repository) {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = Repository::from(&db);
        (db, repo)
    }

    #[tokio::test]
    async fn test_empty_index() {
        let (db, repo) = repo().await;
        assert_eq!(repo.version().await.unwrap(), 0);
        assert!(repo.list().await.unwrap().is_empty());
        assert!(repo.log(10).await.unwrap().is_empty());
        db.close().await;
    }

    #[tokio::test]
    async fn test_record_replaces_and_increments() {
        let (db, repo) = repo().await;
        let v1 = repo.record(&[entry("b.md", 1), entry("a.md", 1)], "init").await.unwrap();
        assert_eq!(v1, 1);
        assert_eq!(repo.list().await.unwrap(), [entry("a.md", 1), entry("b.md", 1)]);

        let v2 = repo.record(&[entry("c.md", 2)], "get").await.unwrap();
        assert_eq!(v2, 2);
        assert_eq!(repo.version().await.unwrap(), 2);
        // Replaced, not merged.
        assert_eq!(repo.list().await.unwrap(), [entry("c.md", 2)]);

        let log = repo.log(10).await.unwrap();
        let messages: Vec<_> = log.iter().map(|c| (c.version, c.message.as_str())).collect();
        assert_eq!(messages, [(2, "get"), (1, "init")]);
        assert_eq!(repo.log(1).await.unwrap().len(), 1);
        db.close().await;
    }

    #[tokio::test]
    async fn test_query_against_disk() {
        let (db, repo) = repo().await;
        repo.record(&[entry("kept.md", 5), entry("gone.md", 5)], "init").await.unwrap();
        let disk = [
            LocalFile { path: "kept.md".to_string(), absolute: PathBuf::from("/r/kept.md"), size: 3, ctime: 5 },
            LocalFile { path: "added.md".to_string(), absolute: PathBuf::from("/r/added.md"), size: 1, ctime: 9 },
        ];
        let delta = repo.query(&disk).await.unwrap();
        assert_eq!(delta.clean, [entry("kept.md", 5)]);
        assert_eq!(delta.new, ["added.md"]);
        assert_eq!(delta.deleted, ["gone.md"]);
        db.close().await;
    }
}
