//! Connection manager for the remote store.

use crate::error::{ErrorKind, Result};
use crate::session::Session;
use exn::ResultExt;
use quill_asyncutils::RetryPolicy;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::instrument;

// One session at a time, plus a spare connection for reconnect pings.
const MAX_CONNECTIONS: u32 = 2;

/// Connection pool for the remote store.
///
/// Every unit of work happens inside a [`Session`] obtained from
/// [`begin`](Self::begin). Sessions never commit on their own.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    reconnect: RetryPolicy,
}

impl Database {
    async fn new(options: SqliteConnectOptions, max: u32, reconnect: RetryPolicy) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max)
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Connection)?;
        Ok(Self { pool, reconnect })
    }

    /// Connect using a `sqlite:` URL, creating the database file if needed.
    #[instrument(skip(url))]
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with(url, RetryPolicy::RECONNECT).await
    }

    /// Like [`connect`](Self::connect), with a custom reconnect policy.
    pub async fn connect_with(url: &str, reconnect: RetryPolicy) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .or_raise(|| ErrorKind::Connection)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        Self::new(options, MAX_CONNECTIONS, reconnect).await
    }

    /// Connect to an in-memory database.
    ///
    /// Not gated behind `#[cfg(test)]` so that other crates can use it in
    /// their tests.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new().filename(":memory:").foreign_keys(true);
        // Every pooled connection to ":memory:" would be its own database.
        Self::new(options, 1, RetryPolicy::new(1, Duration::ZERO)).await
    }

    /// Open a session (a database transaction).
    pub async fn begin(&self) -> Result<Session> {
        let tx = self.pool.begin().await.or_raise(|| ErrorKind::Connection)?;
        Ok(Session::new(tx, self.clone()))
    }

    /// Run a trivial statement on a fresh connection.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Connection)?;
        Ok(())
    }

    /// Ping until the store answers or the reconnect policy is exhausted.
    #[instrument(skip(self))]
    pub async fn recover(&self) -> Result<()> {
        self.reconnect
            .run("remote reconnect", |_| self.ping())
            .await
            .or_raise(|| ErrorKind::ConnectionLost)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the pool. The instance must not be used afterwards.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ping_and_close() {
        let db = Database::connect_in_memory().await.unwrap();
        db.ping().await.unwrap();
        db.recover().await.unwrap();
        db.close().await;
        assert!(db.ping().await.is_err());
        let err = db.recover().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::ConnectionLost));
    }

    #[tokio::test]
    async fn test_connect_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("remote.db").display());
        let db = Database::connect(&url).await.unwrap();
        db.ping().await.unwrap();
        db.close().await;
        assert!(dir.path().join("remote.db").exists());
    }
}
