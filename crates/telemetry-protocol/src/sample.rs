//! Telemetry Sample

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Timestamp format used for `captured_at` in logs (local time, millisecond precision)
pub const CAPTURE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// One validated reading decoded from a single datagram.
///
/// All derived fields are computed in [`TelemetrySample::new`], so a sample
/// can't exist with units that disagree with each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Local wall clock at receipt
    captured_at: DateTime<Local>,
    /// Datagram origin
    source: SocketAddr,
    /// Device milliseconds since boot
    device_millis: u64,
    /// Temperature (°C)
    temperature_c: f64,
    /// Pressure (Pa)
    pressure_pa: i64,
    /// Pressure (hPa)
    pressure_hpa: f64,
    /// Device uptime in seconds
    elapsed_s: f64,
}

impl TelemetrySample {
    /// Build a sample from the raw device readings
    ///
    /// # Arguments
    /// * `captured_at` - Local receipt time
    /// * `source` - Address the datagram came from
    /// * `device_millis` - Device milliseconds since boot
    /// * `raw_temp_x100` - Temperature in hundredths of a degree
    /// * `pressure_pa` - Pressure in pascals
    pub fn new(
        captured_at: DateTime<Local>,
        source: SocketAddr,
        device_millis: u64,
        raw_temp_x100: f64,
        pressure_pa: i64,
    ) -> Self {
        Self {
            captured_at,
            source,
            device_millis,
            temperature_c: raw_temp_x100 / 100.0,
            pressure_pa,
            pressure_hpa: pressure_pa as f64 / 100.0,
            elapsed_s: device_millis as f64 / 1000.0,
        }
    }

    pub fn captured_at(&self) -> DateTime<Local> {
        self.captured_at
    }

    /// Receipt time as ISO-8601 with milliseconds
    pub fn captured_at_iso(&self) -> String {
        self.captured_at.format(CAPTURE_TIME_FORMAT).to_string()
    }

    pub fn source(&self) -> SocketAddr {
        self.source
    }

    pub fn device_millis(&self) -> u64 {
        self.device_millis
    }

    pub fn temperature_c(&self) -> f64 {
        self.temperature_c
    }

    pub fn pressure_pa(&self) -> i64 {
        self.pressure_pa
    }

    pub fn pressure_hpa(&self) -> f64 {
        self.pressure_hpa
    }

    /// Seconds since device boot (x axis of the live view)
    pub fn elapsed_s(&self) -> f64 {
        self.elapsed_s
    }
}
