//! Receiver Error Types

use thiserror::Error;

/// Errors surfaced by the receiver to its owner.
///
/// Steady-state problems (bad packets, timeouts, consumer panics) never show
/// up here; they are absorbed by the receive loop.
#[derive(Debug, Error)]
pub enum ReceiverError {
    /// Socket could not be bound
    #[error("Failed to bind UDP socket on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Socket option or address query failed
    #[error("Socket error: {0}")]
    Socket(#[from] std::io::Error),

    /// Background thread could not be spawned
    #[error("Failed to spawn receive thread: {0}")]
    Spawn(String),

    /// Receiver was already closed; the lifecycle is single-use
    #[error("Receiver is closed")]
    Closed,

    /// Receive thread didn't finish within the join timeout
    #[error("Receive thread did not stop within {0}ms")]
    JoinTimeout(u64),

    /// Receive thread panicked outside the per-datagram guard
    #[error("Receive thread panicked")]
    WorkerPanicked,
}
