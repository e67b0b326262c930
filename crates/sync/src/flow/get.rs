use crate::diff::{classify_directories, classify_files};
use crate::error::{ErrorKind, Result, filesystem};
use crate::flow::{Context, Outcome, finish, remote_inventory};
use crate::local::LocalState;
use crate::transfer::{TransferStats, download};
use exn::ResultExt;
use quill_remote::{Database, Session};
use quill_storage::{DirectoryEntry, FsTransaction};
use tracing::instrument;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GetMode {
    /// Download what differs, carry unchanged files over.
    #[default]
    Changes,
    /// Download every file.
    All,
}

/// Make the local tree mirror the store.
///
/// The tree is rewritten inside one filesystem transaction: on any failure
/// (or cancellation) the original tree is put back untouched. Files that
/// exist only locally are dropped, so that case needs confirmation. Ignored
/// paths and symlinks are never synced and are carried over as they are.
#[instrument(skip(ctx, db, local))]
pub async fn get(
    ctx: &Context,
    db: &Database,
    local: &dyn LocalState,
    mode: GetMode,
) -> Result<Outcome<TransferStats>> {
    let mut session = db.begin().await.or_raise(|| ErrorKind::Remote)?;
    let result = get_inner(ctx, &mut session, local, mode).await;
    finish(session, result).await
}

async fn get_inner(
    ctx: &Context,
    session: &mut Session,
    local: &dyn LocalState,
    mode: GetMode,
) -> Result<Outcome<TransferStats>> {
    let (remote_files, remote_dirs) = remote_inventory(session).await?;
    if remote_files.is_empty() && remote_dirs.is_empty() {
        tracing::info!("remote store is empty; nothing to get");
        return Ok(Outcome::NoData);
    }
    let tree = local.load().await?;
    let files = classify_files(&remote_files, &tree.inventory.files);
    let dirs = classify_directories(&remote_dirs, &tree.inventory.directories);
    tracing::info!(files = %files, directories = %dirs, "compared with remote");
    if mode == GetMode::Changes && files.is_empty_change() && dirs.is_empty_change() {
        return Ok(Outcome::UpToDate);
    }
    if (!files.local_only.is_empty() || !dirs.local_only.is_empty())
        && !ctx.confirm(&format!(
            "{} local-only files and {} local-only directories will be removed. Continue?",
            files.local_only.len(),
            dirs.local_only.len()
        ))
    {
        return Ok(Outcome::Declined);
    }

    let (fetch, keep): (Vec<String>, Vec<String>) = match mode {
        GetMode::Changes => (
            files.remote_only.iter().chain(&files.altered).cloned().collect(),
            files.unchanged.iter().cloned().collect(),
        ),
        GetMode::All => (remote_files.iter().map(|f| f.path.clone()).collect(), Vec::new()),
    };

    let mut tx = FsTransaction::begin(local.root()).await.map_err(filesystem)?;
    let written = rewrite(ctx, session, &mut tx, &tree.untracked, &remote_dirs, &keep, &fetch).await;
    let stats = match written {
        Ok(stats) => {
            tx.commit().await.map_err(filesystem)?;
            stats
        },
        Err(err) => {
            tracing::warn!(error = ?err, "rewrite failed; restoring local tree");
            tx.rollback().await.map_err(filesystem)?;
            return Err(err);
        },
    };
    tracing::info!(%stats, kept = keep.len(), untracked = tree.untracked.len(), "local tree replaced");

    if let Some(version) = local.refresh(&remote_files, "get").await? {
        tracing::debug!(version, "local index refreshed");
    }
    Ok(Outcome::Applied(stats))
}

async fn rewrite(
    ctx: &Context,
    session: &mut Session,
    tx: &mut FsTransaction,
    untracked: &[String],
    directories: &[DirectoryEntry],
    keep: &[String],
    fetch: &[String],
) -> Result<TransferStats> {
    for path in untracked {
        tx.carry_from_backup(path).await.map_err(filesystem)?;
    }
    for dir in directories {
        tx.create_dir(&dir.path).await.map_err(filesystem)?;
    }
    for path in keep {
        tx.link_from_backup(path).await.map_err(filesystem)?;
    }
    download(session, tx, fetch, ctx.max_packet_size(), ctx.progress()).await
}
