//! thermo Core - Shared types for the temperature broadcaster
//!
//! This crate provides the domain types shared between the daemon
//! (thermod) and the wire protocol crate:
//! - `units` - Celsius to Fahrenheit conversion and text formatting
//! - `reading` - the per-tick `Reading` value
//! - `ports` - traits the sensor and display drivers implement
//! - `handle` - owned handles that release devices on every exit path
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod handle;
pub mod ports;
pub mod reading;
pub mod state;
pub mod units;

// Re-exports for convenience
pub use error::{DeviceError, DeviceResult};
pub use handle::{DisplayHandle, SensorHandle};
pub use ports::{DeviceProvider, DisplaySink, SensorSource};
pub use reading::Reading;
pub use state::SessionState;
pub use units::{celsius_to_fahrenheit, format_temperature};
