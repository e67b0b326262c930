use crate::error::{ErrorKind, Result, filesystem};
use crate::flow::{Outcome, finish};
use crate::transfer::{TransferMeter, TransferStats};
use exn::ResultExt;
use quill_remote::{Database, Download, Session};
use quill_storage::FsTransaction;
use quill_storage::error::ErrorKind as StorageErrorKind;
use std::path::Path;
use time::UtcDateTime;
use tracing::instrument;

/// Write every file as it existed at `at` into `dest`.
///
/// `dest` must be missing or an empty directory. The store is only read.
#[instrument(skip(db), fields(dest = %dest.display()))]
pub async fn snapshot(db: &Database, at: UtcDateTime, dest: &Path) -> Result<Outcome<TransferStats>> {
    ensure_empty(dest).await?;
    let mut session = db.begin().await.or_raise(|| ErrorKind::Remote)?;
    let result = fetch(&mut session, at).await;
    let files = finish(session, result).await?;
    if files.is_empty() {
        tracing::info!("no files existed at that instant");
        return Ok(Outcome::NoData);
    }

    let tx = FsTransaction::begin(dest).await.map_err(filesystem)?;
    let mut meter = TransferMeter::new("snapshot", files.len(), None);
    for file in &files {
        if let Err(err) = tx.write(&file.path, &file.content).await {
            tx.rollback().await.map_err(filesystem)?;
            return Err(filesystem(err));
        }
        meter.record(1, file.content.len() as u64);
    }
    tx.commit().await.map_err(filesystem)?;
    Ok(Outcome::Applied(meter.finish()))
}

async fn fetch(session: &mut Session, at: UtcDateTime) -> Result<Vec<Download>> {
    session.snapshot(at).await.or_raise(|| ErrorKind::Remote)
}

async fn ensure_empty(dest: &Path) -> Result<()> {
    match tokio::fs::read_dir(dest).await {
        Ok(mut entries) => {
            let first = entries
                .next_entry()
                .await
                .map_err(|e| StorageErrorKind::from_io(e, dest))
                .or_raise(|| ErrorKind::Filesystem)?;
            if first.is_some() {
                let occupied = exn::Exn::from(StorageErrorKind::AlreadyExists(dest.to_path_buf()));
                return Err(occupied.raise(ErrorKind::Filesystem));
            }
            Ok(())
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(StorageErrorKind::from_io(err, dest)).or_raise(|| ErrorKind::Filesystem),
    }
}
