//! Datagram Parsing
//!
//! Datagrams are UTF-8 text of the form `ms=1500,t_x100=2350,p_pa=101325`.
//! Fields without `=` are skipped, unknown keys are kept in the field map but
//! otherwise ignored.

use crate::error::ProtocolError;
use crate::keys;
use crate::sample::TelemetrySample;
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::net::SocketAddr;
use tracing::trace;

/// A single field value, typed as loosely as the device sends it
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    /// Type a raw value: integer first, then float, else keep the text
    pub fn from_raw(raw: &str) -> Self {
        if let Ok(i) = raw.parse::<i64>() {
            FieldValue::Int(i)
        } else if let Ok(f) = raw.parse::<f64>() {
            FieldValue::Float(f)
        } else {
            FieldValue::Text(raw.to_string())
        }
    }

    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            FieldValue::Text(_) => None,
        }
    }
}

/// Split a decoded datagram into its typed key/value fields
pub fn parse_fields(text: &str) -> HashMap<String, FieldValue> {
    text.trim()
        .split(',')
        .filter_map(|part| part.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), FieldValue::from_raw(v.trim())))
        .collect()
}

/// Parse a raw datagram into a sample, stamped with the current local time.
///
/// Returns `None` for anything that isn't a complete telemetry packet.
/// Never panics, whatever the input bytes.
pub fn parse_sample(bytes: &[u8], source: SocketAddr) -> Option<TelemetrySample> {
    match try_parse_sample(bytes, source) {
        Ok(sample) => Some(sample),
        Err(e) => {
            trace!("Dropping datagram from {}: {}", source, e);
            None
        }
    }
}

/// Like [`parse_sample`], but reports why a packet was rejected
pub fn try_parse_sample(
    bytes: &[u8],
    source: SocketAddr,
) -> Result<TelemetrySample, ProtocolError> {
    let text = String::from_utf8_lossy(bytes);
    let fields = parse_fields(&text);
    decode(&fields, source, Local::now())
}

fn decode(
    fields: &HashMap<String, FieldValue>,
    source: SocketAddr,
    captured_at: DateTime<Local>,
) -> Result<TelemetrySample, ProtocolError> {
    let ms = required(fields, keys::DEVICE_MILLIS)?;
    let t_x100 = required(fields, keys::TEMP_X100)?;
    let p_pa = required(fields, keys::PRESSURE_PA)?;

    let device_millis = match ms {
        FieldValue::Int(i) => {
            u64::try_from(*i).map_err(|_| ProtocolError::OutOfRange {
                field: keys::DEVICE_MILLIS,
                value: *i as f64,
            })?
        }
        other => {
            let value = numeric(other, keys::DEVICE_MILLIS)?.trunc();
            if value < 0.0 || value >= u64::MAX as f64 {
                return Err(ProtocolError::OutOfRange {
                    field: keys::DEVICE_MILLIS,
                    value,
                });
            }
            value as u64
        }
    };

    let raw_temp_x100 = numeric(t_x100, keys::TEMP_X100)?;

    let pressure_pa = match p_pa {
        FieldValue::Int(i) => *i,
        other => {
            let value = numeric(other, keys::PRESSURE_PA)?.trunc();
            if value < i64::MIN as f64 || value >= i64::MAX as f64 {
                return Err(ProtocolError::OutOfRange {
                    field: keys::PRESSURE_PA,
                    value,
                });
            }
            value as i64
        }
    };

    Ok(TelemetrySample::new(
        captured_at,
        source,
        device_millis,
        raw_temp_x100,
        pressure_pa,
    ))
}

fn required<'a>(
    fields: &'a HashMap<String, FieldValue>,
    key: &'static str,
) -> Result<&'a FieldValue, ProtocolError> {
    fields.get(key).ok_or(ProtocolError::MissingField(key))
}

/// Finite numeric value of a field, or the reason it has none
fn numeric(value: &FieldValue, field: &'static str) -> Result<f64, ProtocolError> {
    match value.as_f64() {
        Some(v) if v.is_finite() => Ok(v),
        Some(v) => Err(ProtocolError::OutOfRange { field, value: v }),
        None => Err(ProtocolError::NonNumeric {
            field,
            value: match value {
                FieldValue::Text(s) => s.clone(),
                _ => String::new(),
            },
        }),
    }
}
