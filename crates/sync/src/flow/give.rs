use crate::diff::{DirectoryClassification, FileClassification, classify_directories, classify_files};
use crate::error::{ErrorKind, Result};
use crate::flow::{Context, Outcome, finish, remote_inventory};
use crate::local::LocalState;
use crate::transfer::{TransferStats, UploadKind, plan_uploads, upload};
use exn::ResultExt;
use quill_remote::{Database, Session};
use quill_storage::LocalFile;
use time::UtcDateTime;
use tracing::instrument;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GiveMode {
    /// Upload what differs.
    #[default]
    Changes,
    /// Also re-upload every file both sides already agree on.
    All,
}

/// What a committed give changed in the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GiveReport {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub directories_created: usize,
    pub directories_deleted: usize,
    pub transfer: TransferStats,
}

impl GiveReport {
    fn prompt(&self) -> String {
        format!(
            "{} new, {} updated and {} deleted files; {} new and {} deleted directories. Commit?",
            self.inserted, self.updated, self.deleted, self.directories_created, self.directories_deleted
        )
    }
}

/// Make the store mirror the local tree.
///
/// Everything happens in one session that is only committed once the
/// confirmation says so. A file too large for one transfer aborts the run
/// before anything is sent.
#[instrument(skip(ctx, db, local))]
pub async fn give(ctx: &Context, db: &Database, local: &dyn LocalState, mode: GiveMode) -> Result<Outcome<GiveReport>> {
    let mut session = db.begin().await.or_raise(|| ErrorKind::Remote)?;
    let result = give_inner(ctx, &mut session, local, mode).await;
    finish(session, result).await
}

async fn give_inner(
    ctx: &Context,
    session: &mut Session,
    local: &dyn LocalState,
    mode: GiveMode,
) -> Result<Outcome<GiveReport>> {
    let (remote_files, remote_dirs) = remote_inventory(session).await?;
    let tree = local.load().await?;
    let files = classify_files(&remote_files, &tree.inventory.files);
    let dirs = classify_directories(&remote_dirs, &tree.inventory.directories);
    tracing::info!(files = %files, directories = %dirs, "compared with remote");
    if mode == GiveMode::Changes && files.is_empty_change() && dirs.is_empty_change() {
        return Ok(Outcome::UpToDate);
    }

    let inserts = plan_uploads(tree.select(&files.local_only), ctx.max_packet_size())?;
    let updates = match mode {
        GiveMode::Changes => tree.select(&files.altered),
        GiveMode::All => tree.select(files.altered.union(&files.unchanged)),
    };
    let updates = plan_uploads(updates, ctx.max_packet_size())?;

    let report = apply(ctx, session, &files, &dirs, &inserts, &updates).await?;
    if !ctx.confirm(&report.prompt()) {
        session.rollback().await.or_raise(|| ErrorKind::Remote)?;
        tracing::info!("give declined; remote store unchanged");
        return Ok(Outcome::Declined);
    }
    if let Err(err) = session.commit().await {
        if ctx.is_forced() {
            return Err(err.raise(ErrorKind::Remote).raise(ErrorKind::ForcedCommit));
        }
        return Err(err.raise(ErrorKind::Remote));
    }
    tracing::info!(transfer = %report.transfer, "remote store updated");

    if let Some(version) = local.refresh(&tree.inventory.files, "give").await? {
        tracing::debug!(version, "local index refreshed");
    }
    Ok(Outcome::Applied(report))
}

async fn apply(
    ctx: &Context,
    session: &mut Session,
    files: &FileClassification,
    dirs: &DirectoryClassification,
    inserts: &[Vec<LocalFile>],
    updates: &[Vec<LocalFile>],
) -> Result<GiveReport> {
    let at = UtcDateTime::now();
    let inserted = upload(session, inserts, UploadKind::Insert, at, ctx.progress()).await?;
    let updated = upload(session, updates, UploadKind::Update, at, ctx.progress()).await?;

    let deleted: Vec<String> = files.remote_only.iter().cloned().collect();
    session.delete_paths(&deleted).await.or_raise(|| ErrorKind::Remote)?;
    let stale_dirs: Vec<String> = dirs.remote_only.iter().cloned().collect();
    session.delete_directories(&stale_dirs).await.or_raise(|| ErrorKind::Remote)?;
    let new_dirs: Vec<String> = dirs.local_only.iter().cloned().collect();
    session.insert_directories(&new_dirs).await.or_raise(|| ErrorKind::Remote)?;

    Ok(GiveReport {
        inserted: inserted.files,
        updated: updated.files,
        deleted: deleted.len(),
        directories_created: new_dirs.len(),
        directories_deleted: stale_dirs.len(),
        transfer: inserted.merge(updated),
    })
}
