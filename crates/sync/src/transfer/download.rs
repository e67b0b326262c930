use crate::error::{ErrorKind, Result, filesystem};
use crate::transfer::meter::{ProgressFn, TransferMeter, TransferStats};
use crate::transfer::sizing::batch_size;
use exn::ResultExt;
use quill_remote::Session;
use quill_remote::error::ErrorKind as RemoteErrorKind;
use quill_storage::FsTransaction;
use tracing::instrument;

/// Fetch `paths` from the store in batches and write them into the staged
/// tree of `tx`.
///
/// Any failure aborts the whole download; the caller rolls `tx` back.
#[instrument(skip_all, fields(files = paths.len()))]
pub async fn download(
    session: &mut Session,
    tx: &FsTransaction,
    paths: &[String],
    max_packet_size: u64,
    progress: Option<&ProgressFn>,
) -> Result<TransferStats> {
    let mut meter = TransferMeter::new("download", paths.len(), progress);
    if paths.is_empty() {
        return Ok(meter.finish());
    }
    let average = session.average_record_size().await.or_raise(|| ErrorKind::Remote)?;
    let size = batch_size(average, max_packet_size);
    tracing::debug!(?average, batch = size, "download batch size");
    for (batch, chunk) in paths.chunks(size).enumerate() {
        let files = session.fetch_batch(chunk).await.or_raise(|| ErrorKind::Remote)?;
        if files.len() != chunk.len() {
            // Every path came from the inventory of this same session.
            let missing = chunk.iter().find(|p| !files.iter().any(|f| &f.path == *p)).cloned().unwrap_or_default();
            return Err(exn::Exn::from(RemoteErrorKind::MissingRecord(missing)).raise(ErrorKind::Remote));
        }
        let mut bytes = 0;
        for file in &files {
            tx.write(&file.path, &file.content).await.map_err(filesystem)?;
            bytes += file.content.len() as u64;
        }
        tracing::trace!(batch, files = files.len(), "batch written");
        meter.record(files.len(), bytes);
    }
    Ok(meter.finish())
}
