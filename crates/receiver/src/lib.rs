//! Telemetry Receiver
//!
//! Owns the UDP socket and the single background thread that turns datagrams
//! into samples and hands them to the registered consumers.

mod consumer;
mod error;
mod receiver;
mod shutdown;
mod stats;

pub use consumer::{from_fn, FnConsumer, SampleConsumer};
pub use error::ReceiverError;
pub use receiver::{ReceiverConfig, DEFAULT_PORT, ReceiverState, TelemetryReceiver};
pub use shutdown::ShutdownSignal;
pub use stats::{ReceiverStats, ReceiverStatsSnapshot};
