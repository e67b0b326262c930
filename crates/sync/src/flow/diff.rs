use crate::diff::{DirectoryClassification, FileClassification, classify_directories, classify_files};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use crate::flow::{finish, remote_inventory};
use crate::local::LocalState;
use quill_remote::{Database, Session};
use tracing::instrument;

/// Discrepancies between the local tree and the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffReport {
    pub files: FileClassification,
    pub directories: DirectoryClassification,
}

impl DiffReport {
    pub fn is_in_sync(&self) -> bool {
        self.files.is_empty_change() && self.directories.is_empty_change()
    }
}

/// Compare both sides. Read-only: the session is rolled back.
#[instrument(skip_all)]
pub async fn diff(db: &Database, local: &dyn LocalState) -> Result<DiffReport> {
    let mut session = db.begin().await.or_raise(|| ErrorKind::Remote)?;
    let result = compare(&mut session, local).await;
    finish(session, result).await
}

async fn compare(session: &mut Session, local: &dyn LocalState) -> Result<DiffReport> {
    let (remote_files, remote_dirs) = remote_inventory(session).await?;
    let tree = local.load().await?;
    let report = DiffReport {
        files: classify_files(&remote_files, &tree.inventory.files),
        directories: classify_directories(&remote_dirs, &tree.inventory.directories),
    };
    tracing::info!(files = %report.files, directories = %report.directories, "diff");
    Ok(report)
}
