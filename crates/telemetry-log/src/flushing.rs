//! Periodically Flushing Log Consumer

use crate::csv_log::CsvSampleLog;
use crate::LogError;
use receiver::SampleConsumer;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use telemetry_protocol::TelemetrySample;
use tracing::warn;

/// Default number of samples between flushes
pub const DEFAULT_FLUSH_EVERY: u64 = 20;

/// Receiver consumer that writes every sample and flushes every
/// `flush_every` samples.
pub struct FlushingLog {
    log: Mutex<CsvSampleLog>,
    /// Samples handed to this log, shared with whoever holds the log
    received: AtomicU64,
    flush_every: u64,
}

impl FlushingLog {
    /// Wrap a log; `flush_every == 0` disables periodic flushing
    pub fn new(log: CsvSampleLog, flush_every: u64) -> Self {
        Self {
            log: Mutex::new(log),
            received: AtomicU64::new(0),
            flush_every,
        }
    }

    pub fn with_default_flush(log: CsvSampleLog) -> Self {
        Self::new(log, DEFAULT_FLUSH_EVERY)
    }

    /// Samples received so far
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn path(&self) -> PathBuf {
        self.lock().path().to_path_buf()
    }

    pub fn flush(&self) -> Result<(), LogError> {
        self.lock().flush()
    }

    /// Flush and close the underlying file
    pub fn close(&self) -> Result<(), LogError> {
        self.lock().close()
    }

    fn lock(&self) -> MutexGuard<'_, CsvSampleLog> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SampleConsumer for FlushingLog {
    fn on_sample(&self, sample: &TelemetrySample) {
        let mut log = self.lock();
        if let Err(e) = log.write(sample) {
            warn!("Failed to log sample: {}", e);
        }

        let received = self.received.fetch_add(1, Ordering::Relaxed) + 1;
        if self.flush_every > 0 && received % self.flush_every == 0 {
            if let Err(e) = log.flush() {
                warn!("Failed to flush sample log: {}", e);
            }
        }
    }
}
