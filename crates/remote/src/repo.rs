//! Queries against the versioned tables.
//!
//! Every method runs inside the calling [`Session`]; none of them commits.

use crate::error::{ErrorKind, Result};
use crate::models::{
    ContentRow, DeadDelta, DeadDeltaRow, DeletedRecord, DeletedRow, Delta, DeltaRow, DirectoryRow, Download, FileRow,
    RecordRow, StoredRecord, Upload, to_millis,
};
use crate::session::Session;
use quill_storage::{DirectoryEntry, FileEntry};
use sqlx::{QueryBuilder, Sqlite};
use time::UtcDateTime;
use tracing::instrument;

/// Bound parameters per statement accepted by SQLite.
const MAX_BIND_PARAMETERS: usize = 32_766;

fn rows_per_statement(binds_per_row: usize) -> usize {
    (MAX_BIND_PARAMETERS / binds_per_row).max(1)
}

impl Session {
    // =========================================================================
    // Inventory
    // =========================================================================

    /// Every live file with its hash, sorted by path.
    pub async fn list_files(&mut self) -> Result<Vec<FileEntry>> {
        let result = sqlx::query_as::<_, FileRow>(include_str!("../queries/list_files.sql"))
            .fetch_all(self.conn()?)
            .await;
        self.check(result).await?.into_iter().map(FileEntry::try_from).collect()
    }

    /// Every directory, sorted by path.
    pub async fn list_directories(&mut self) -> Result<Vec<DirectoryEntry>> {
        let result = sqlx::query_as::<_, DirectoryRow>(include_str!("../queries/list_directories.sql"))
            .fetch_all(self.conn()?)
            .await;
        Ok(self.check(result).await?.into_iter().map(DirectoryEntry::from).collect())
    }

    /// Mean content length of the live records, `None` when there are none.
    pub async fn average_record_size(&mut self) -> Result<Option<u64>> {
        let result = sqlx::query_scalar::<_, Option<f64>>(include_str!("../queries/average_record_size.sql"))
            .fetch_one(self.conn()?)
            .await;
        let average = self.check(result).await?;
        // Lengths are never negative; the cast saturates anyway.
        Ok(average.map(|avg| avg.ceil() as u64))
    }

    // =========================================================================
    // Read
    // =========================================================================

    /// Current content for `paths`, sorted by path. Unknown paths are skipped.
    #[instrument(skip(self, paths), fields(paths = paths.len()))]
    pub async fn fetch_batch(&mut self, paths: &[String]) -> Result<Vec<Download>> {
        let mut downloads = Vec::with_capacity(paths.len());
        for chunk in paths.chunks(rows_per_statement(1)) {
            let mut query = QueryBuilder::<Sqlite>::new("SELECT path, content, hash FROM notes WHERE path IN (");
            let mut list = query.separated(", ");
            for path in chunk {
                list.push_bind(path.as_str());
            }
            list.push_unseparated(")");
            let result = query.build_query_as::<ContentRow>().fetch_all(self.conn()?).await;
            for row in self.check(result).await? {
                downloads.push(Download::try_from(row)?);
            }
        }
        downloads.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(downloads)
    }

    /// The live record at `path`, if any.
    pub async fn record(&mut self, path: &str) -> Result<Option<StoredRecord>> {
        let result = sqlx::query_as::<_, RecordRow>(include_str!("../queries/get_record.sql"))
            .bind(path)
            .fetch_optional(self.conn()?)
            .await;
        self.check(result).await?.map(StoredRecord::try_from).transpose()
    }

    // =========================================================================
    // Write
    // =========================================================================

    /// Insert new records. `at` becomes both their origin and last edit.
    #[instrument(skip(self, uploads), fields(uploads = uploads.len()))]
    pub async fn insert_batch(&mut self, uploads: &[Upload], at: UtcDateTime) -> Result<()> {
        let at = to_millis(at)?;
        for chunk in uploads.chunks(rows_per_statement(5)) {
            let mut query =
                QueryBuilder::<Sqlite>::new("INSERT INTO notes (path, content, hash, origin_at, last_edit_at) ");
            query.push_values(chunk, |mut row, upload| {
                row.push_bind(upload.path.as_str())
                    .push_bind(upload.content.as_slice())
                    .push_bind(upload.hash.to_bytes().to_vec())
                    .push_bind(at)
                    .push_bind(at);
            });
            let result = query.build().execute(self.conn()?).await;
            self.check(result).await?;
        }
        Ok(())
    }

    /// Replace the content of existing records, one statement per record.
    ///
    /// The archive trigger moves each previous version into the history with
    /// a validity ending at `at`.
    #[instrument(skip(self, uploads), fields(uploads = uploads.len()))]
    pub async fn update_batch(&mut self, uploads: &[Upload], at: UtcDateTime) -> Result<()> {
        let at = to_millis(at)?;
        for upload in uploads {
            let result = sqlx::query(include_str!("../queries/update_file.sql"))
                .bind(upload.content.as_slice())
                .bind(upload.hash.to_bytes().to_vec())
                .bind(at)
                .bind(upload.path.as_str())
                .execute(self.conn()?)
                .await;
            if self.check(result).await?.rows_affected() != 1 {
                exn::bail!(ErrorKind::MissingRecord(upload.path.clone()));
            }
        }
        Ok(())
    }

    /// Delete records; the archive trigger moves them to the graveyard.
    #[instrument(skip(self, paths), fields(paths = paths.len()))]
    pub async fn delete_paths(&mut self, paths: &[String]) -> Result<()> {
        self.delete_in("DELETE FROM notes WHERE path IN (", paths).await
    }

    pub async fn insert_directories(&mut self, paths: &[String]) -> Result<()> {
        for chunk in paths.chunks(rows_per_statement(1)) {
            let mut query = QueryBuilder::<Sqlite>::new("INSERT INTO directories (path) ");
            query.push_values(chunk, |mut row, path| {
                row.push_bind(path.as_str());
            });
            let result = query.build().execute(self.conn()?).await;
            self.check(result).await?;
        }
        Ok(())
    }

    pub async fn delete_directories(&mut self, paths: &[String]) -> Result<()> {
        self.delete_in("DELETE FROM directories WHERE path IN (", paths).await
    }

    async fn delete_in(&mut self, statement: &'static str, paths: &[String]) -> Result<()> {
        for chunk in paths.chunks(rows_per_statement(1)) {
            let mut query = QueryBuilder::<Sqlite>::new(statement);
            let mut list = query.separated(", ");
            for path in chunk {
                list.push_bind(path.as_str());
            }
            list.push_unseparated(")");
            let result = query.build().execute(self.conn()?).await;
            self.check(result).await?;
        }
        Ok(())
    }

    // =========================================================================
    // History
    // =========================================================================

    /// Every file as it existed at `at`, sorted by path.
    ///
    /// Covers files that still exist (resolved against their history) and
    /// files deleted after `at` (resolved against the graveyard).
    #[instrument(skip(self))]
    pub async fn snapshot(&mut self, at: UtcDateTime) -> Result<Vec<Download>> {
        let result = sqlx::query_as::<_, ContentRow>(include_str!("../queries/snapshot.sql"))
            .bind(to_millis(at)?)
            .fetch_all(self.conn()?)
            .await;
        self.check(result).await?.into_iter().map(Download::try_from).collect()
    }

    /// Superseded versions of the live record at `path`, oldest first.
    pub async fn history(&mut self, path: &str) -> Result<Vec<Delta>> {
        let result = sqlx::query_as::<_, DeltaRow>(include_str!("../queries/history.sql"))
            .bind(path)
            .fetch_all(self.conn()?)
            .await;
        self.check(result).await?.into_iter().map(Delta::try_from).collect()
    }

    /// Every deletion of a record at `path`, oldest first.
    pub async fn graveyard(&mut self, path: &str) -> Result<Vec<DeletedRecord>> {
        let result = sqlx::query_as::<_, DeletedRow>(include_str!("../queries/graveyard.sql"))
            .bind(path)
            .fetch_all(self.conn()?)
            .await;
        self.check(result).await?.into_iter().map(DeletedRecord::try_from).collect()
    }

    /// History of a deleted record, oldest first.
    pub async fn dead_deltas(&mut self, deleted_id: i64) -> Result<Vec<DeadDelta>> {
        let result = sqlx::query_as::<_, DeadDeltaRow>(include_str!("../queries/dead_deltas.sql"))
            .bind(deleted_id)
            .fetch_all(self.conn()?)
            .await;
        self.check(result).await?.into_iter().map(DeadDelta::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use quill_storage::ContentHash;

    fn at(millis: i64) -> UtcDateTime {
        UtcDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).unwrap()
    }

    fn contents(downloads: &[Download]) -> Vec<(&str, &[u8])> {
        downloads.iter().map(|d| (d.path.as_str(), d.content.as_slice())).collect()
    }

    async fn session() -> (Database, Session) {
        let db = Database::connect_in_memory().await.unwrap();
        let mut session = db.begin().await.unwrap();
        session.ensure_schema().await.unwrap();
        (db, session)
    }

    #[tokio::test]
    async fn test_inventory_and_fetch() {
        let (_db, mut s) = session().await;
        s.insert_batch(&[Upload::new("b.md", b"bee".to_vec()), Upload::new("a.md", b"ay".to_vec())], at(1))
            .await
            .unwrap();
        s.insert_directories(&["sub".to_string(), "empty".to_string()]).await.unwrap();

        let files = s.list_files().await.unwrap();
        let expected = [
            FileEntry::new("a.md", ContentHash::of(b"ay")),
            FileEntry::new("b.md", ContentHash::of(b"bee")),
        ];
        assert_eq!(files, expected);
        assert_eq!(s.list_directories().await.unwrap(), [DirectoryEntry::new("empty"), DirectoryEntry::new("sub")]);
        assert_eq!(s.average_record_size().await.unwrap(), Some(3));

        let fetched = s.fetch_batch(&["b.md".to_string(), "missing.md".to_string()]).await.unwrap();
        assert_eq!(contents(&fetched), [("b.md", &b"bee"[..])]);

        s.delete_directories(&["empty".to_string()]).await.unwrap();
        assert_eq!(s.list_directories().await.unwrap(), [DirectoryEntry::new("sub")]);
        s.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_store() {
        let (_db, mut s) = session().await;
        assert!(s.list_files().await.unwrap().is_empty());
        assert_eq!(s.average_record_size().await.unwrap(), None);
        s.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_update_archives_previous_version() {
        let (_db, mut s) = session().await;
        s.insert_batch(&[Upload::new("n.md", b"v1".to_vec())], at(1_000)).await.unwrap();
        s.update_batch(&[Upload::new("n.md", b"v2".to_vec())], at(2_000)).await.unwrap();

        let record = s.record("n.md").await.unwrap().unwrap();
        assert_eq!(record.content, b"v2");
        assert_eq!(record.origin_at, at(1_000));
        assert_eq!(record.last_edit_at, at(2_000));

        let history = s.history("n.md").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, b"v1");
        assert_eq!((history[0].valid_from, history[0].valid_to), (at(1_000), at(2_000)));
        s.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_update_of_missing_record_fails() {
        let (_db, mut s) = session().await;
        let err = s.update_batch(&[Upload::new("ghost.md", b"x".to_vec())], at(1)).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::MissingRecord(p) if p == "ghost.md"));
        s.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_snapshot_reconstructs_past_states() {
        let (_db, mut s) = session().await;
        let (t1, t2, t3) = (at(1_000), at(2_000), at(3_000));
        s.insert_batch(&[Upload::new("n.md", b"one".to_vec())], t1).await.unwrap();
        s.update_batch(&[Upload::new("n.md", b"two".to_vec())], t2).await.unwrap();
        s.update_batch(&[Upload::new("n.md", b"three".to_vec())], t3).await.unwrap();
        s.insert_batch(&[Upload::new("late.md", b"late".to_vec())], t3).await.unwrap();

        assert!(s.snapshot(at(999)).await.unwrap().is_empty());
        assert_eq!(contents(&s.snapshot(t1).await.unwrap()), [("n.md", &b"one"[..])]);
        assert_eq!(contents(&s.snapshot(at(1_500)).await.unwrap()), [("n.md", &b"one"[..])]);
        assert_eq!(contents(&s.snapshot(t2).await.unwrap()), [("n.md", &b"two"[..])]);
        assert_eq!(
            contents(&s.snapshot(t3).await.unwrap()),
            [("late.md", &b"late"[..]), ("n.md", &b"three"[..])]
        );
        s.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_deleted_records_move_to_graveyard() {
        let (_db, mut s) = session().await;
        s.insert_batch(&[Upload::new("n.md", b"one".to_vec())], at(1_000)).await.unwrap();
        s.update_batch(&[Upload::new("n.md", b"two".to_vec())], at(2_000)).await.unwrap();
        s.delete_paths(&["n.md".to_string()]).await.unwrap();

        assert!(s.list_files().await.unwrap().is_empty());
        assert!(s.record("n.md").await.unwrap().is_none());

        let graves = s.graveyard("n.md").await.unwrap();
        assert_eq!(graves.len(), 1);
        assert_eq!(graves[0].content, b"two");
        assert!(graves[0].deleted_at > at(2_000));
        let dead = s.dead_deltas(graves[0].id).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].content, b"one");

        // Deleted "now", so both past states are still reconstructible.
        assert_eq!(contents(&s.snapshot(at(1_500)).await.unwrap()), [("n.md", &b"one"[..])]);
        assert_eq!(contents(&s.snapshot(at(2_500)).await.unwrap()), [("n.md", &b"two"[..])]);
        assert!(s.snapshot(UtcDateTime::now() + time::Duration::hours(1)).await.unwrap().is_empty());
        s.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_truncate_empties_history_too() {
        let (_db, mut s) = session().await;
        s.insert_batch(&[Upload::new("n.md", b"one".to_vec())], at(1_000)).await.unwrap();
        s.update_batch(&[Upload::new("n.md", b"two".to_vec())], at(2_000)).await.unwrap();
        s.truncate_all().await.unwrap();
        assert!(s.list_files().await.unwrap().is_empty());
        assert!(s.graveyard("n.md").await.unwrap().is_empty());
        assert!(s.snapshot(at(1_500)).await.unwrap().is_empty());
        s.close().await.unwrap();
    }
}
