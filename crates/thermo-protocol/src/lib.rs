//! thermo Protocol - Service identity and wire format
//!
//! This crate describes what a client sees: the service record the daemon
//! advertises (friendly name + fixed UUID) and the bytes it sends once per
//! tick while the client is connected.

pub mod service;
pub mod wire;

pub use service::{ServiceError, ServiceRecord, DEFAULT_SERVICE_NAME, DEFAULT_SERVICE_UUID};
pub use wire::{decode_reading, encode_reading, WireError};
