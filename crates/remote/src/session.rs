//! A unit of work against the remote store.

use crate::db::Database;
use crate::error::{ErrorKind, Result, is_connection_error};
use exn::{OptionExt, ResultExt};
use sqlx::{Sqlite, SqliteConnection, Transaction};

/// An open database transaction.
///
/// Nothing is ever committed implicitly: [`commit`](Self::commit) must be
/// called for writes to persist. [`close`](Self::close) ends the session
/// cleanly without committing, and dropping a session that is still open
/// (an error propagated past it, or the flow was cancelled) rolls back.
pub struct Session {
    tx: Option<Transaction<'static, Sqlite>>,
    db: Database,
}

impl Session {
    pub(crate) fn new(tx: Transaction<'static, Sqlite>, db: Database) -> Self {
        Self { tx: Some(tx), db }
    }

    /// `true` until the session is committed or rolled back.
    pub fn is_open(&self) -> bool {
        self.tx.is_some()
    }

    pub(crate) fn conn(&mut self) -> Result<&mut SqliteConnection> {
        self.tx.as_deref_mut().ok_or_raise(|| ErrorKind::SessionClosed)
    }

    /// Map a statement failure onto an error kind.
    ///
    /// A broken connection triggers the reconnect policy. The session is lost
    /// either way; the ping only decides between [`ErrorKind::Connection`]
    /// and [`ErrorKind::ConnectionLost`].
    pub(crate) async fn check<T>(&self, result: sqlx::Result<T>) -> Result<T> {
        match result {
            Ok(value) => Ok(value),
            Err(err) if is_connection_error(&err) => {
                tracing::warn!(error = %err, "remote connection broke mid-session");
                self.db.recover().await?;
                Err(err).or_raise(|| ErrorKind::Connection)
            },
            Err(err) => Err(err).or_raise(|| ErrorKind::Database),
        }
    }

    /// Persist everything done in this session.
    pub async fn commit(&mut self) -> Result<()> {
        let tx = self.tx.take().ok_or_raise(|| ErrorKind::SessionClosed)?;
        let result = tx.commit().await;
        self.check(result).await?;
        tracing::debug!("remote session committed");
        Ok(())
    }

    /// Discard everything done in this session.
    pub async fn rollback(&mut self) -> Result<()> {
        let tx = self.tx.take().ok_or_raise(|| ErrorKind::SessionClosed)?;
        let result = tx.rollback().await;
        self.check(result).await?;
        tracing::debug!("remote session rolled back");
        Ok(())
    }

    /// End the session. Anything not committed yet is rolled back.
    pub async fn close(mut self) -> Result<()> {
        if self.is_open() {
            self.rollback().await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("open", &self.is_open()).finish_non_exhaustive()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.tx.is_some() {
            // sqlx queues the rollback when the transaction is dropped.
            tracing::warn!("remote session dropped while open; rolling back");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn count(db: &Database) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM t").fetch_one(db.pool()).await.unwrap()
    }

    async fn setup() -> Database {
        let db = Database::connect_in_memory().await.unwrap();
        sqlx::query("CREATE TABLE t (x INTEGER)").execute(db.pool()).await.unwrap();
        db
    }

    async fn insert(session: &mut Session) {
        let result = sqlx::query("INSERT INTO t (x) VALUES (1)").execute(session.conn().unwrap()).await;
        session.check(result).await.unwrap();
    }

    #[tokio::test]
    async fn test_commit_persists() {
        let db = setup().await;
        let mut session = db.begin().await.unwrap();
        insert(&mut session).await;
        session.commit().await.unwrap();
        assert!(!session.is_open());
        drop(session);
        assert_eq!(count(&db).await, 1);
    }

    #[tokio::test]
    async fn test_close_does_not_commit() {
        let db = setup().await;
        let mut session = db.begin().await.unwrap();
        insert(&mut session).await;
        session.close().await.unwrap();
        assert_eq!(count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_drop_rolls_back() {
        let db = setup().await;
        let mut session = db.begin().await.unwrap();
        insert(&mut session).await;
        drop(session);
        assert_eq!(count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_closed_session_rejects_statements() {
        let db = setup().await;
        let mut session = db.begin().await.unwrap();
        session.rollback().await.unwrap();
        assert!(matches!(&*session.conn().unwrap_err(), ErrorKind::SessionClosed));
        assert!(matches!(&*session.commit().await.unwrap_err(), ErrorKind::SessionClosed));
    }
}
