//! Sample Ring Buffer
//!
//! Bounded, thread-safe store of the most recent telemetry samples, kept as
//! three aligned projections (elapsed seconds, temperature, pressure).

mod buffer;

pub use buffer::{SampleBuffer, DEFAULT_CAPACITY};

use serde::{Deserialize, Serialize};

/// Point-in-time copy of the buffer contents, oldest first.
///
/// The three series always have the same length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Device uptime (s)
    pub elapsed_s: Vec<f64>,
    /// Temperature (°C)
    pub temperature_c: Vec<f64>,
    /// Pressure (hPa)
    pub pressure_hpa: Vec<f64>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.elapsed_s.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elapsed_s.is_empty()
    }

    /// Most recent (elapsed, temperature, pressure) point
    pub fn latest(&self) -> Option<(f64, f64, f64)> {
        let i = self.len().checked_sub(1)?;
        Some((self.elapsed_s[i], self.temperature_c[i], self.pressure_hpa[i]))
    }
}
