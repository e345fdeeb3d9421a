//! Device errors following panic-free policy.

use std::io;
use thiserror::Error;

/// Errors raised by sensor and display drivers.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// The device could not be opened
    #[error("Failed to open {device}: {reason}")]
    Open { device: &'static str, reason: String },

    /// Underlying I/O failed
    #[error("{device} I/O error: {source}")]
    Io {
        device: &'static str,
        #[source]
        source: io::Error,
    },

    /// The device returned something that is not a temperature
    #[error("Invalid data from {device}: {reason}")]
    InvalidData { device: &'static str, reason: String },

    /// Operation on a handle that was already closed
    #[error("{device} is closed")]
    Closed { device: &'static str },
}

impl DeviceError {
    /// Wraps an I/O error for the named device.
    pub fn io(device: &'static str, source: io::Error) -> Self {
        Self::Io { device, source }
    }

    /// Returns the device this error refers to.
    pub fn device(&self) -> &'static str {
        match self {
            Self::Open { device, .. }
            | Self::Io { device, .. }
            | Self::InvalidData { device, .. }
            | Self::Closed { device } => device,
        }
    }
}

/// Result type for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;
