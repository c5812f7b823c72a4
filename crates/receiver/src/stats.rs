//! Receive Loop Counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the receive thread and readable from anywhere.
///
/// Each increment is mirrored to the `metrics` facade; without an installed
/// recorder that is a no-op.
#[derive(Debug, Default)]
pub struct ReceiverStats {
    datagrams: AtomicU64,
    samples: AtomicU64,
    rejected: AtomicU64,
    receive_errors: AtomicU64,
    consumer_panics: AtomicU64,
    parser_panics: AtomicU64,
}

/// Plain copy of [`ReceiverStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStatsSnapshot {
    /// Datagrams read from the socket
    pub datagrams: u64,
    /// Datagrams that parsed into a sample and were dispatched
    pub samples: u64,
    /// Datagrams that weren't telemetry packets, or were too long
    pub rejected: u64,
    /// Non-timeout receive errors the loop survived
    pub receive_errors: u64,
    /// Consumer panics caught at the loop boundary
    pub consumer_panics: u64,
    /// Parser panics caught at the loop boundary
    pub parser_panics: u64,
}

impl ReceiverStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_datagram(&self) {
        self.datagrams.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("telemetry_datagrams_total").increment(1);
    }

    pub(crate) fn record_sample(&self) {
        self.samples.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("telemetry_samples_total").increment(1);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("telemetry_rejected_total").increment(1);
    }

    pub(crate) fn record_receive_error(&self) {
        self.receive_errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("telemetry_receive_errors_total").increment(1);
    }

    pub(crate) fn record_consumer_panic(&self) {
        self.consumer_panics.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("telemetry_consumer_panics_total").increment(1);
    }

    pub(crate) fn record_parser_panic(&self) {
        self.parser_panics.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("telemetry_parser_panics_total").increment(1);
    }

    pub fn snapshot(&self) -> ReceiverStatsSnapshot {
        ReceiverStatsSnapshot {
            datagrams: self.datagrams.load(Ordering::Relaxed),
            samples: self.samples.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            receive_errors: self.receive_errors.load(Ordering::Relaxed),
            consumer_panics: self.consumer_panics.load(Ordering::Relaxed),
            parser_panics: self.parser_panics.load(Ordering::Relaxed),
        }
    }
}
