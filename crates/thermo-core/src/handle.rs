//! Owned device handles.
//!
//! `SensorHandle` and `DisplayHandle` take ownership of an opened driver and
//! guarantee it is closed exactly once: explicitly through `close()`, or on
//! drop for any path that never reached an explicit close (early return,
//! failed start, panicking task).

use tracing::{debug, warn};

use crate::error::{DeviceError, DeviceResult};
use crate::ports::{DisplaySink, SensorSource};

const SENSOR: &str = "sensor";
const DISPLAY: &str = "display";

/// Exclusive handle to an open temperature sensor.
pub struct SensorHandle {
    inner: Option<Box<dyn SensorSource>>,
}

impl SensorHandle {
    pub fn new(sensor: Box<dyn SensorSource>) -> Self {
        Self {
            inner: Some(sensor),
        }
    }

    /// Reads one sample in Celsius.
    ///
    /// # Errors
    ///
    /// - `DeviceError::Closed` once the handle has been closed
    /// - whatever the driver reports
    pub fn read_celsius(&mut self) -> DeviceResult<f32> {
        self.inner
            .as_mut()
            .ok_or(DeviceError::Closed { device: SENSOR })?
            .read_celsius()
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    /// Closes the sensor. Further calls are no-ops.
    pub fn close(&mut self) -> DeviceResult<()> {
        match self.inner.take() {
            Some(mut sensor) => {
                debug!("Closing sensor");
                sensor.close()
            }
            None => Ok(()),
        }
    }
}

impl Drop for SensorHandle {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "Failed to close sensor on drop");
        }
    }
}

/// Exclusive handle to an open display.
pub struct DisplayHandle {
    inner: Option<Box<dyn DisplaySink>>,
}

impl DisplayHandle {
    pub fn new(display: Box<dyn DisplaySink>) -> Self {
        Self {
            inner: Some(display),
        }
    }

    fn sink(&mut self) -> DeviceResult<&mut Box<dyn DisplaySink>> {
        self.inner.as_mut().ok_or(DeviceError::Closed { device: DISPLAY })
    }

    pub fn render(&mut self, text: &str) -> DeviceResult<()> {
        self.sink()?.render(text)
    }

    pub fn clear(&mut self) -> DeviceResult<()> {
        self.sink()?.clear()
    }

    pub fn set_enabled(&mut self, enabled: bool) -> DeviceResult<()> {
        self.sink()?.set_enabled(enabled)
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    /// Clears, disables and closes the display. Further calls are no-ops.
    ///
    /// All three steps run even if an earlier one fails; the first error
    /// is returned.
    pub fn close(&mut self) -> DeviceResult<()> {
        let Some(mut display) = self.inner.take() else {
            return Ok(());
        };
        debug!("Closing display");

        let cleared = display.clear();
        let disabled = display.set_enabled(false);
        let closed = display.close();
        cleared.and(disabled).and(closed)
    }
}

impl Drop for DisplayHandle {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "Failed to close display on drop");
        }
    }
}
