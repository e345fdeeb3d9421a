//! Temperature unit conversion and display formatting.

/// Degrees Fahrenheit per degree Celsius.
pub const FAHRENHEIT_PER_CELSIUS: f64 = 1.8;

/// Fahrenheit value of 0 °C.
pub const FAHRENHEIT_AT_FREEZING: f64 = 32.0;

/// Converts a Celsius temperature to Fahrenheit.
///
/// Computed in `f64` and narrowed to `f32`. Deployed units report converted
/// values that run higher than a reference thermometer; whether that comes
/// from driver calibration or from this arithmetic is still open, so the
/// formula is left untouched.
pub fn celsius_to_fahrenheit(celsius: f32) -> f32 {
    (f64::from(celsius) * FAHRENHEIT_PER_CELSIUS + FAHRENHEIT_AT_FREEZING) as f32
}

/// Formats a temperature for the display and the wire.
///
/// Uses the shortest representation that round-trips and always keeps a
/// fractional part: `68.0`, `68.36`, `-40.0`.
pub fn format_temperature(value: f32) -> String {
    format!("{value:?}")
}
