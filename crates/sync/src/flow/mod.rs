//! End-to-end operations.
//!
//! Each flow opens exactly one remote session and closes it on every path:
//! committed when the flow says so, rolled back otherwise. Filesystem
//! rewrites go through one [`FsTransaction`](quill_storage::FsTransaction).

mod context;
mod diff;
mod get;
mod give;
mod init;
mod snapshot;

pub use self::context::{Always, Confirm, Context, DEFAULT_MAX_PACKET_SIZE, Never};
pub use self::diff::{DiffReport, diff};
pub use self::get::{GetMode, get};
pub use self::give::{GiveMode, GiveReport, give};
pub use self::init::{InitReport, SchemaAction, init};
pub use self::snapshot::snapshot;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use quill_remote::Session;
use quill_remote::error::ErrorKind as RemoteErrorKind;
use quill_storage::{DirectoryEntry, FileEntry};

/// How a mutating flow ended, when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// Changes were made.
    Applied(T),
    /// There was nothing to transfer from.
    NoData,
    /// Both sides already agree.
    UpToDate,
    /// The user said no; nothing was changed.
    Declined,
}

impl<T> Outcome<T> {
    pub fn applied(self) -> Option<T> {
        match self {
            Self::Applied(value) => Some(value),
            _ => None,
        }
    }
}

/// Close `session` and pass `result` through. A failure to close is only
/// reported if the flow itself succeeded.
async fn finish<T>(session: Session, result: Result<T>) -> Result<T> {
    let closed = session.close().await;
    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(err.raise(ErrorKind::Remote)),
        (Err(err), closed) => {
            if let Err(close) = closed {
                tracing::warn!(error = ?close, "could not close remote session after failure");
            }
            Err(err)
        },
    }
}

/// Remote inventory; fails if the schema was never initialised or its
/// history triggers are gone, since writes would then go unrecorded.
async fn remote_inventory(session: &mut Session) -> Result<(Vec<FileEntry>, Vec<DirectoryEntry>)> {
    let tables = session.tables_exist().await.or_raise(|| ErrorKind::Remote)?;
    let triggers = tables && session.triggers_exist().await.or_raise(|| ErrorKind::Remote)?;
    if !triggers {
        tracing::error!(tables, "remote schema is incomplete; run init");
        return Err(exn::Exn::from(RemoteErrorKind::Schema).raise(ErrorKind::Remote));
    }
    let files = session.list_files().await.or_raise(|| ErrorKind::Remote)?;
    let directories = session.list_directories().await.or_raise(|| ErrorKind::Remote)?;
    tracing::debug!(files = files.len(), directories = directories.len(), "remote inventory");
    Ok((files, directories))
}
