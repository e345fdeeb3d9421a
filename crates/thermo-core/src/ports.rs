//! Device ports - traits implemented by sensor and display drivers.
//!
//! The engine reads temperatures and renders text without knowing which
//! hardware sits behind these traits (sysfs thermal zone, I2C sensor,
//! segment display, console, in-memory fake).

use crate::error::DeviceResult;

/// Port for reading the temperature sensor.
///
/// Reads are assumed synchronous and fast; the engine calls `read_celsius`
/// once per tick.
pub trait SensorSource: Send {
    /// Take a single reading in degrees Celsius.
    fn read_celsius(&mut self) -> DeviceResult<f32>;

    /// Release the sensor. Called at most once by the owning handle.
    fn close(&mut self) -> DeviceResult<()>;
}

/// Port for the local numeric display.
pub trait DisplaySink: Send {
    /// Show `text`, replacing whatever is displayed.
    fn render(&mut self, text: &str) -> DeviceResult<()>;

    /// Blank the display.
    fn clear(&mut self) -> DeviceResult<()>;

    /// Power the display on or off.
    fn set_enabled(&mut self, enabled: bool) -> DeviceResult<()>;

    /// Release the display. Called at most once by the owning handle.
    fn close(&mut self) -> DeviceResult<()>;
}

/// Opens the exclusive device resources for a session.
///
/// Each call returns a fresh driver; the session owns it until shutdown.
pub trait DeviceProvider: Send + Sync {
    fn open_sensor(&self) -> DeviceResult<Box<dyn SensorSource>>;

    fn open_display(&self) -> DeviceResult<Box<dyn DisplaySink>>;
}
