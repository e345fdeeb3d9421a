//! Sysfs thermal sensor.
//!
//! Thermal zones (`/sys/class/thermal/thermal_zone*/temp`) and hwmon inputs
//! (`/sys/class/hwmon/hwmon*/temp*_input`) both report millidegrees Celsius
//! as a decimal integer.

use std::fs;
use std::path::{Path, PathBuf};

use thermo_core::{DeviceError, DeviceResult, SensorSource};
use tracing::{debug, trace};

/// First thermal zone, the SoC sensor on most boards.
pub const DEFAULT_SENSOR_PATH: &str = "/sys/class/thermal/thermal_zone0/temp";

const DEVICE: &str = "sensor";

const MILLIDEGREES_PER_DEGREE: f32 = 1000.0;

/// Temperature sensor backed by a sysfs file.
#[derive(Debug)]
pub struct SysfsThermalSensor {
    path: PathBuf,
    closed: bool,
}

impl SysfsThermalSensor {
    /// Opens the sensor and takes one reading to prove the path works.
    ///
    /// # Errors
    ///
    /// `DeviceError::Open` if the file is missing or does not hold a
    /// temperature.
    pub fn open(path: impl AsRef<Path>) -> DeviceResult<Self> {
        let path = path.as_ref().to_path_buf();
        let celsius = read_millidegrees(&path).map_err(|e| DeviceError::Open {
            device: DEVICE,
            reason: format!("{}: {e}", path.display()),
        })?;
        debug!(path = %path.display(), celsius, "Sensor opened");
        Ok(Self {
            path,
            closed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SensorSource for SysfsThermalSensor {
    fn read_celsius(&mut self) -> DeviceResult<f32> {
        if self.closed {
            return Err(DeviceError::Closed { device: DEVICE });
        }
        let celsius = read_millidegrees(&self.path)?;
        trace!(celsius, "Sensor read");
        Ok(celsius)
    }

    fn close(&mut self) -> DeviceResult<()> {
        self.closed = true;
        Ok(())
    }
}

fn read_millidegrees(path: &Path) -> DeviceResult<f32> {
    let raw = fs::read_to_string(path).map_err(|e| DeviceError::io(DEVICE, e))?;
    let trimmed = raw.trim();
    let millidegrees: i64 = trimmed.parse().map_err(|_| DeviceError::InvalidData {
        device: DEVICE,
        reason: format!("expected millidegrees, got {trimmed:?}"),
    })?;
    Ok(millidegrees as f32 / MILLIDEGREES_PER_DEGREE)
}
