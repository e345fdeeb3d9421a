//! Wire format.
//!
//! Once per tick the daemon writes the decimal text of the converted
//! temperature to the connected client. There is no framing, length prefix
//! or acknowledgment; a client reading a slow stream may see several values
//! run together.

use thermo_core::Reading;
use thiserror::Error;

/// Encodes a reading as sent to the client.
pub fn encode_reading(reading: &Reading) -> String {
    reading.display_text()
}

/// Parses one value received from the daemon.
///
/// # Errors
///
/// Returns `WireError::Empty` for blank input and `WireError::NotANumber`
/// when the text is not a finite decimal.
pub fn decode_reading(text: &str) -> Result<f32, WireError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(WireError::Empty);
    }
    match trimmed.parse::<f32>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(WireError::NotANumber(trimmed.to_string())),
    }
}

/// Errors decoding data received from the daemon.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("Empty payload")]
    Empty,

    #[error("Not a temperature: {0:?}")]
    NotANumber(String),
}
