use std::fmt;
use std::time::{Duration, Instant};

/// Running totals handed to a progress callback after every batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferProgress {
    pub direction: &'static str,
    pub files: usize,
    pub total_files: usize,
    pub bytes: u64,
    /// Bytes per second since the transfer started.
    pub rate: f64,
}

/// What one transfer moved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub files: usize,
    pub bytes: u64,
    pub elapsed: Duration,
}

impl TransferStats {
    /// Bytes per second; zero for an instantaneous transfer.
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 { self.bytes as f64 / secs } else { 0.0 }
    }

    /// Totals of two consecutive transfers.
    pub fn merge(self, other: Self) -> Self {
        Self { files: self.files + other.files, bytes: self.bytes + other.bytes, elapsed: self.elapsed + other.elapsed }
    }
}

impl fmt::Display for TransferStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} files, {:.1} KiB in {:.2}s ({:.1} KiB/s)",
            self.files,
            self.bytes as f64 / 1024.0,
            self.elapsed.as_secs_f64(),
            self.rate() / 1024.0
        )
    }
}

/// Callback invoked after every batch.
pub type ProgressFn = dyn Fn(&TransferProgress) + Send + Sync;

/// Measures a transfer as batches complete.
pub struct TransferMeter<'a> {
    direction: &'static str,
    total_files: usize,
    files: usize,
    bytes: u64,
    started: Instant,
    progress: Option<&'a ProgressFn>,
}

impl<'a> TransferMeter<'a> {
    pub fn new(direction: &'static str, total_files: usize, progress: Option<&'a ProgressFn>) -> Self {
        Self { direction, total_files, files: 0, bytes: 0, started: Instant::now(), progress }
    }

    /// Account for one finished batch.
    pub fn record(&mut self, files: usize, bytes: u64) {
        self.files += files;
        self.bytes += bytes;
        let progress = TransferProgress {
            direction: self.direction,
            files: self.files,
            total_files: self.total_files,
            bytes: self.bytes,
            rate: self.rate(),
        };
        tracing::info!(
            direction = self.direction,
            files = self.files,
            of = self.total_files,
            bytes = self.bytes,
            rate = format_args!("{:.1} KiB/s", progress.rate / 1024.0),
            "batch transferred"
        );
        if let Some(callback) = self.progress {
            callback(&progress);
        }
    }

    pub fn rate(&self) -> f64 {
        self.stats().rate()
    }

    fn stats(&self) -> TransferStats {
        TransferStats { files: self.files, bytes: self.bytes, elapsed: self.started.elapsed() }
    }

    pub fn finish(self) -> TransferStats {
        let stats = self.stats();
        tracing::debug!(direction = self.direction, %stats, "transfer finished");
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_meter_reports_every_batch() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback = move |p: &TransferProgress| sink.lock().unwrap().push((p.files, p.bytes));
        let mut meter = TransferMeter::new("download", 3, Some(&callback));
        meter.record(2, 10);
        meter.record(1, 5);
        let stats = meter.finish();
        assert_eq!((stats.files, stats.bytes), (3, 15));
        assert_eq!(*seen.lock().unwrap(), [(2, 10), (3, 15)]);
    }

    #[test]
    fn test_stats_rate_and_merge() {
        let a = TransferStats { files: 1, bytes: 2048, elapsed: Duration::from_secs(2) };
        assert_eq!(a.rate(), 1024.0);
        assert_eq!(TransferStats::default().rate(), 0.0);
        let total = a.merge(TransferStats { files: 2, bytes: 1024, elapsed: Duration::from_secs(1) });
        assert_eq!(total, TransferStats { files: 3, bytes: 3072, elapsed: Duration::from_secs(3) });
        assert_eq!(total.to_string(), "3 files, 3.0 KiB in 3.00s (1.0 KiB/s)");
    }
}
