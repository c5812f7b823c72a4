//! Mutex-Guarded Ring Buffer Implementation

use crate::Snapshot;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use telemetry_protocol::TelemetrySample;
use tracing::debug;

/// Default buffer capacity (2000 points = ~3 min at 10Hz)
pub const DEFAULT_CAPACITY: usize = 2000;

/// Parallel fixed-size slots; `head` is the next write position
struct Ring {
    elapsed_s: Box<[f64]>,
    temperature_c: Box<[f64]>,
    pressure_hpa: Box<[f64]>,
    head: usize,
    len: usize,
}

impl Ring {
    fn new(capacity: usize) -> Self {
        Self {
            elapsed_s: vec![0.0; capacity].into_boxed_slice(),
            temperature_c: vec![0.0; capacity].into_boxed_slice(),
            pressure_hpa: vec![0.0; capacity].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.elapsed_s.len()
    }

    fn push(&mut self, elapsed_s: f64, temperature_c: f64, pressure_hpa: f64) {
        let capacity = self.capacity();
        self.elapsed_s[self.head] = elapsed_s;
        self.temperature_c[self.head] = temperature_c;
        self.pressure_hpa[self.head] = pressure_hpa;
        self.head = (self.head + 1) % capacity;
        // At capacity the write above replaced the oldest slot
        if self.len < capacity {
            self.len += 1;
        }
    }

    fn snapshot(&self) -> Snapshot {
        let capacity = self.capacity();
        let start = (self.head + capacity - self.len) % capacity;
        let mut snapshot = Snapshot {
            elapsed_s: Vec::with_capacity(self.len),
            temperature_c: Vec::with_capacity(self.len),
            pressure_hpa: Vec::with_capacity(self.len),
        };
        for i in 0..self.len {
            let idx = (start + i) % capacity;
            snapshot.elapsed_s.push(self.elapsed_s[idx]);
            snapshot.temperature_c.push(self.temperature_c[idx]);
            snapshot.pressure_hpa.push(self.pressure_hpa[idx]);
        }
        snapshot
    }
}

/// Fixed-capacity, drop-oldest buffer of sample projections.
///
/// One writer (the receive loop) and any number of readers. The lock is held
/// only for the slot writes of an append or the copy of a snapshot.
pub struct SampleBuffer {
    ring: Mutex<Ring>,
    capacity: usize,
    /// Total samples ever appended (for statistics)
    total_appended: AtomicUsize,
}

impl SampleBuffer {
    /// Create a new buffer with given capacity (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        debug!("Creating sample buffer with capacity {}", capacity);
        Self {
            ring: Mutex::new(Ring::new(capacity)),
            capacity,
            total_appended: AtomicUsize::new(0),
        }
    }

    /// Create a buffer with default capacity (2000 points)
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    /// Append a sample's projections (overwrites oldest if full)
    pub fn append(&self, sample: &TelemetrySample) {
        self.push(
            sample.elapsed_s(),
            sample.temperature_c(),
            sample.pressure_hpa(),
        );
    }

    /// Append one point directly
    pub fn push(&self, elapsed_s: f64, temperature_c: f64, pressure_hpa: f64) {
        self.lock().push(elapsed_s, temperature_c, pressure_hpa);
        self.total_appended.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current contents, oldest first
    pub fn snapshot(&self) -> Snapshot {
        self.lock().snapshot()
    }

    /// Number of points currently retained
    pub fn len(&self) -> usize {
        self.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get fill ratio (0.0 to 1.0)
    pub fn fill_ratio(&self) -> f64 {
        self.len() as f64 / self.capacity as f64
    }

    /// Total points appended since creation, including evicted ones
    pub fn total_appended(&self) -> usize {
        self.total_appended.load(Ordering::Relaxed)
    }

    /// Drop all retained points
    pub fn clear(&self) {
        let mut ring = self.lock();
        ring.head = 0;
        ring.len = 0;
    }

    /// A panic while holding the lock can't leave the ring half-written in a
    /// way that breaks its indices, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Ring> {
        self.ring.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

impl std::fmt::Debug for SampleBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleBuffer")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("total_appended", &self.total_appended())
            .finish()
    }
}
