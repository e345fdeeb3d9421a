//! Connection-oriented transport used to reach the single client.
//!
//! The engine only talks to these traits. A deployment plugs in the adapter
//! that matches its radio; `TcpAdapter` is the stock implementation and the
//! one the integration tests drive over loopback.
//!
//! ```text
//! WirelessAdapter ──listen(service)──▶ ServerSocket ──accept()──▶ ClientSocket
//!                                          │                           │
//!                                   closed right after          installed in the
//!                                   the first accept             ClientSlot
//! ```

mod tcp;

pub use tcp::{TcpAdapter, TcpClient, TcpServer, DEFAULT_LISTEN_ADDR, WRITE_TIMEOUT};

use std::io;

use async_trait::async_trait;
use thermo_protocol::ServiceRecord;
use thiserror::Error;

/// The radio (or stand-in) the daemon advertises itself on.
#[async_trait]
pub trait WirelessAdapter: Send + Sync {
    fn is_enabled(&self) -> bool;

    fn enable(&self) -> Result<(), TransportError>;

    fn disable(&self) -> Result<(), TransportError>;

    /// Sets the friendly name shown to pairing clients.
    fn set_name(&self, name: &str) -> Result<(), TransportError>;

    /// Makes the adapter discoverable. Fire-and-forget: failures are the
    /// adapter's to log.
    fn request_discoverable(&self, service: &ServiceRecord);

    /// Opens a server socket registered under `service`.
    async fn listen(&self, service: &ServiceRecord) -> Result<Box<dyn ServerSocket>, TransportError>;
}

/// A listening socket. Accepts must be cancel-safe: dropping a pending
/// `accept` future may not lose a connection that was already returned.
#[async_trait]
pub trait ServerSocket: Send {
    async fn accept(&mut self) -> Result<Box<dyn ClientSocket>, TransportError>;

    /// Stops listening. Idempotent.
    fn close(&mut self);
}

/// A connected client.
#[async_trait]
pub trait ClientSocket: Send {
    /// Human-readable peer description for logs.
    fn peer(&self) -> String;

    /// Liveness check that does not write to the peer.
    fn is_connected(&self) -> bool;

    /// Writes `payload` and flushes it.
    async fn send(&mut self, payload: &str) -> io::Result<()>;

    /// Shuts the connection down. Idempotent.
    async fn close(&mut self);
}

/// Errors raised by transport adapters.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The adapter is gone for good (no radio, interface removed).
    #[error("Adapter unavailable: {0}")]
    AdapterUnavailable(String),

    /// The adapter is present but switched off.
    #[error("Adapter is disabled")]
    AdapterDisabled,

    #[error("Failed to listen for {service}: {source}")]
    Listen {
        service: String,
        #[source]
        source: io::Error,
    },

    #[error("Accept failed: {0}")]
    Accept(#[source] io::Error),

    #[error("Adapter operation failed: {0}")]
    Adapter(String),
}

impl TransportError {
    /// Returns true when retrying cannot succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::AdapterUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unavailable_is_permanent() {
        assert!(TransportError::AdapterUnavailable("no radio".into()).is_permanent());
        assert!(!TransportError::AdapterDisabled.is_permanent());
        assert!(!TransportError::Accept(io::Error::from(io::ErrorKind::ConnectionAborted))
            .is_permanent());
        assert!(!TransportError::Adapter("busy".into()).is_permanent());
    }

    #[test]
    fn test_listen_error_display() {
        let err = TransportError::Listen {
            service: "Temperature Monitor IoT".into(),
            source: io::Error::from(io::ErrorKind::AddrInUse),
        };
        assert!(err.to_string().contains("Temperature Monitor IoT"));
    }
}
