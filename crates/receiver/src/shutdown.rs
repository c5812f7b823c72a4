//! Shared Cancellation Signal

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One-shot shutdown flag shared by the receiver, the live view and signal
/// handlers. Cloning shares the same flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the signal. Returns `true` only for the call that actually set it.
    pub fn request_shutdown(&self) -> bool {
        !self.flag.swap(true, Ordering::SeqCst)
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
