//! Packet Rejection Reasons

use thiserror::Error;

/// Why a datagram did not produce a sample.
///
/// None of these are failures of the pipeline; they are diagnostics for a
/// packet that simply wasn't telemetry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    /// Required key absent from the packet
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Required key present but its value isn't a number
    #[error("Field {field} is not numeric: {value:?}")]
    NonNumeric { field: &'static str, value: String },

    /// Numeric value that doesn't fit the sample field
    #[error("Field {field} value {value} is out of range")]
    OutOfRange { field: &'static str, value: f64 },
}
