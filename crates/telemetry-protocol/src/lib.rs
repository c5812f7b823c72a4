//! Telemetry Wire Protocol
//!
//! Parses the `key=value,key=value` text datagrams sent by the sensor board
//! into validated [`TelemetrySample`] values.

mod error;
mod parser;
mod sample;

pub use error::ProtocolError;
pub use parser::{parse_fields, parse_sample, try_parse_sample, FieldValue};
pub use sample::TelemetrySample;

/// Wire keys the device sends
pub mod keys {
    /// Device milliseconds since boot
    pub const DEVICE_MILLIS: &str = "ms";
    /// Temperature in hundredths of a degree Celsius
    pub const TEMP_X100: &str = "t_x100";
    /// Pressure in pascals
    pub const PRESSURE_PA: &str = "p_pa";
}
