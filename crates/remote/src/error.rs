//! Remote Store Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// A remote store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for remote store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A statement failed for a reason other than the connection.
    #[display("remote database error")]
    Database,
    /// The connection broke but the store answered a ping afterwards. The
    /// session is gone; the flow may be started again.
    #[display("remote connection interrupted")]
    Connection,
    /// The connection broke and every reconnect ping failed.
    #[display("remote connection lost")]
    ConnectionLost,
    /// The schema (tables or triggers) is missing or incomplete.
    #[display("remote schema is not initialised")]
    Schema,
    /// A statement was issued on a session that was already committed or
    /// rolled back.
    #[display("remote session already closed")]
    SessionClosed,
    /// An update targeted a path that has no record.
    #[display("no remote record for {_0}")]
    MissingRecord(#[error(not(source))] String),
    /// A row could not be converted to or from its model.
    #[display("invalid remote data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection)
    }
}

/// Errors that mean the connection itself is unusable.
pub(crate) fn is_connection_error(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}
