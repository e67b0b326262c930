use crate::error::{ErrorKind, Result};
use crate::transfer::meter::{ProgressFn, TransferMeter, TransferStats};
use exn::ResultExt;
use quill_remote::{Session, Upload};
use quill_storage::LocalFile;
use quill_storage::error::ErrorKind as StorageErrorKind;
use time::UtcDateTime;
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    /// Files the store has never seen.
    Insert,
    /// Files whose record content is replaced.
    Update,
}

/// Read, hash and submit planned batches, one bulk statement per batch.
///
/// Nothing is committed here; the caller owns the session.
#[instrument(skip_all, fields(?kind, batches = batches.len()))]
pub async fn upload(
    session: &mut Session,
    batches: &[Vec<LocalFile>],
    kind: UploadKind,
    at: UtcDateTime,
    progress: Option<&ProgressFn>,
) -> Result<TransferStats> {
    let total = batches.iter().map(Vec::len).sum();
    let mut meter = TransferMeter::new("upload", total, progress);
    for batch in batches {
        let mut uploads = Vec::with_capacity(batch.len());
        for file in batch {
            let content = tokio::fs::read(&file.absolute)
                .await
                .map_err(|e| StorageErrorKind::from_io(e, &file.absolute))
                .or_raise(|| ErrorKind::Filesystem)?;
            uploads.push(Upload::new(file.path.clone(), content));
        }
        let bytes = uploads.iter().map(|u| u.content.len() as u64).sum();
        let submitted = match kind {
            UploadKind::Insert => session.insert_batch(&uploads, at).await,
            UploadKind::Update => session.update_batch(&uploads, at).await,
        };
        submitted.or_raise(|| ErrorKind::Remote)?;
        meter.record(uploads.len(), bytes);
    }
    Ok(meter.finish())
}
