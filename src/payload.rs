// Examon collector - metric aggregation engine
// Copyright (c) 2025 Examon Collector Developers
//
// Licensed under the BSD-3-Clause license.
// See LICENSE file for details.

//! Payload wire format
//!
//! Sensors publish ASCII `"<value>;<timestamp>"`. Both fields are reals; the
//! timestamp is the publisher's logical sample time, not the receive time.

use std::fmt;

use crate::error::DecodeError;

/// One decoded reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// The measured value
    pub value: f64,
    /// Logical timestamp carried in the payload
    pub timestamp: f64,
}

impl Reading {
    /// Create a new reading
    pub fn new(value: f64, timestamp: f64) -> Self {
        Self { value, timestamp }
    }

    /// Decode a raw payload
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(payload).map_err(|_| DecodeError::NotUtf8)?;
        Self::decode_str(text)
    }

    /// Decode a textual payload
    pub fn decode_str(text: &str) -> Result<Self, DecodeError> {
        // Some publishers send C strings including the terminator
        let text = text.trim_end_matches('\0');

        let mut fields = text.split(';');
        let (Some(value), Some(timestamp), None) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(DecodeError::FieldCount {
                found: text.split(';').count(),
            });
        };

        Ok(Self {
            value: parse_field("value", value)?,
            timestamp: parse_field("timestamp", timestamp)?,
        })
    }

    /// Encode in the wire format
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{}", self.value, self.timestamp)
    }
}

fn parse_field(field: &'static str, text: &str) -> Result<f64, DecodeError> {
    let trimmed = text.trim();
    let parsed = trimmed
        .parse::<f64>()
        .map_err(|_| DecodeError::NotANumber {
            field,
            text: trimmed.to_string(),
        })?;
    if !parsed.is_finite() {
        return Err(DecodeError::NonFinite { field });
    }
    Ok(parsed)
}
