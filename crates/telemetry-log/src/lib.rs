//! Telemetry Log
//!
//! Append-only CSV persistence for every received sample.

mod csv_log;
mod flushing;

pub use csv_log::{CsvSampleLog, CSV_HEADER};
pub use flushing::{FlushingLog, DEFAULT_FLUSH_EVERY};

use thiserror::Error;

/// Log errors
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Log I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Log is closed")]
    Closed,
}
