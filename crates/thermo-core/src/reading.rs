//! Per-tick sensor reading.

use std::fmt;

use crate::units::{celsius_to_fahrenheit, format_temperature};

/// A single temperature sample.
///
/// Stored in the sensor's native unit (Celsius). Readings carry no identity
/// beyond their value and are never retained past the tick that produced them.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Reading {
    celsius: f32,
}

impl Reading {
    /// Creates a reading from a Celsius sample.
    pub const fn from_celsius(celsius: f32) -> Self {
        Self { celsius }
    }

    /// Returns the raw sample in Celsius.
    pub fn celsius(&self) -> f32 {
        self.celsius
    }

    /// Returns the sample converted to the display unit.
    pub fn fahrenheit(&self) -> f32 {
        celsius_to_fahrenheit(self.celsius)
    }

    /// Text shown on the display and sent to the client.
    pub fn display_text(&self) -> String {
        format_temperature(self.fahrenheit())
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_text())
    }
}
