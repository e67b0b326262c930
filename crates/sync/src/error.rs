//! Sync Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. Lower-level errors from the storage, index and remote
//! crates are kept as children of the kind raised here.

use derive_more::{Display, Error};
use quill_storage::error::ErrorKind as StorageErrorKind;
use std::path::PathBuf;

/// A sync error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("filesystem error")]
    Filesystem,
    #[display("remote store error")]
    Remote,
    #[display("local index error")]
    Index,
    /// The run cannot succeed with the current settings (a file larger than
    /// the payload budget, for instance). Nothing was transferred.
    #[display("configuration error: {_0}")]
    Configuration(#[error(not(source))] String),
    /// A filesystem transaction could not be undone. The previous tree is at
    /// the given location and must be restored by hand.
    #[display("rollback failed, previous tree preserved at {}", _0.display())]
    RollbackFailed(#[error(not(source))] PathBuf),
    /// The run was forced and failed while committing.
    #[display("forced commit failed")]
    ForcedCommit,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Remote)
    }

    /// Process exit code for a run that ended with this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::ForcedCommit => 3,
            _ => 1,
        }
    }
}

/// Raise a storage error, keeping a failed rollback distinguishable.
pub(crate) fn filesystem(err: quill_storage::error::Error) -> Error {
    let kind = match &*err {
        StorageErrorKind::RollbackFailed(preserved) => ErrorKind::RollbackFailed(preserved.clone()),
        _ => ErrorKind::Filesystem,
    };
    err.raise(kind)
}
