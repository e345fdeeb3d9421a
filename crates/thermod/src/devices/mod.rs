//! Host device adapters.
//!
//! Thin wrappers that let the engine run on a Linux single-board computer:
//! the sensor comes from a sysfs thermal zone, the display is a console
//! stand-in for the segment display.

mod console;
mod sysfs;

pub use console::ConsoleDisplay;
pub use sysfs::{SysfsThermalSensor, DEFAULT_SENSOR_PATH};

use std::path::PathBuf;

use thermo_core::{DeviceProvider, DeviceResult, DisplaySink, SensorSource};

/// Sysfs sensor + stdout display.
#[derive(Debug, Clone)]
pub struct HostDevices {
    sensor_path: PathBuf,
}

impl HostDevices {
    pub fn new(sensor_path: impl Into<PathBuf>) -> Self {
        Self {
            sensor_path: sensor_path.into(),
        }
    }
}

impl DeviceProvider for HostDevices {
    fn open_sensor(&self) -> DeviceResult<Box<dyn SensorSource>> {
        Ok(Box::new(SysfsThermalSensor::open(&self.sensor_path)?))
    }

    fn open_display(&self) -> DeviceResult<Box<dyn DisplaySink>> {
        Ok(Box::new(ConsoleDisplay::stdout()))
    }
}
