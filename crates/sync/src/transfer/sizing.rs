use crate::error::{ErrorKind, Result};
use quill_storage::LocalFile;

/// Share of the maximum payload a batch may fill.
pub const SAFETY_MARGIN: f64 = 0.93;
/// Records per download batch when the average record size is unknown.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Bytes of content one round trip may carry.
pub fn payload_budget(max_packet_size: u64) -> u64 {
    // Exact for any realistic packet size; the float only carries the margin.
    (max_packet_size as f64 * SAFETY_MARGIN).floor() as u64
}

/// Records per download batch, never less than one.
pub fn batch_size(average_record_size: Option<u64>, max_packet_size: u64) -> usize {
    match average_record_size {
        None | Some(0) => DEFAULT_BATCH_SIZE,
        Some(average) => usize::try_from(payload_budget(max_packet_size) / average).unwrap_or(usize::MAX).max(1),
    }
}

/// Split `files` into batches whose on-disk sizes add up to at most the
/// payload budget. Order is preserved.
///
/// Fails before anything is transferred if a single file can never fit.
pub fn plan_uploads(files: Vec<LocalFile>, max_packet_size: u64) -> Result<Vec<Vec<LocalFile>>> {
    let budget = payload_budget(max_packet_size);
    if let Some(file) = files.iter().find(|f| f.size > budget) {
        exn::bail!(ErrorKind::Configuration(format!(
            "{} is {} bytes, more than the {budget} bytes one transfer may carry (raise max_packet_size)",
            file.path, file.size
        )));
    }
    let mut batches = Vec::new();
    let mut batch = Vec::new();
    let mut used = 0u64;
    for file in files {
        if !batch.is_empty() && used + file.size > budget {
            batches.push(std::mem::take(&mut batch));
            used = 0;
        }
        used += file.size;
        batch.push(file);
    }
    if !batch.is_empty() {
        batches.push(batch);
    }
    Ok(batches)
}
