//! Console display.
//!
//! Writes one line per display update to any writer. Stands in for the
//! four-character segment display on hosts without one.

use std::io::{self, Write};

use thermo_core::{DeviceError, DeviceResult, DisplaySink};

const DEVICE: &str = "display";

/// Line-oriented display on a writer.
pub struct ConsoleDisplay<W: Write + Send> {
    out: W,
    enabled: bool,
    closed: bool,
}

impl ConsoleDisplay<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ConsoleDisplay<W> {
    /// Creates a display that starts switched off.
    pub fn new(out: W) -> Self {
        Self {
            out,
            enabled: false,
            closed: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_line(&mut self, line: &str) -> DeviceResult<()> {
        if self.closed {
            return Err(DeviceError::Closed { device: DEVICE });
        }
        // A switched-off panel shows nothing.
        if !self.enabled {
            return Ok(());
        }
        writeln!(self.out, "{line}")
            .and_then(|()| self.out.flush())
            .map_err(|e| DeviceError::io(DEVICE, e))
    }
}

impl<W: Write + Send> DisplaySink for ConsoleDisplay<W> {
    fn render(&mut self, text: &str) -> DeviceResult<()> {
        self.write_line(&format!("[{text:>5}]"))
    }

    fn clear(&mut self) -> DeviceResult<()> {
        self.write_line("[     ]")
    }

    fn set_enabled(&mut self, enabled: bool) -> DeviceResult<()> {
        if self.closed {
            return Err(DeviceError::Closed { device: DEVICE });
        }
        self.enabled = enabled;
        Ok(())
    }

    fn close(&mut self) -> DeviceResult<()> {
        self.closed = true;
        self.out.flush().map_err(|e| DeviceError::io(DEVICE, e))
    }
}
