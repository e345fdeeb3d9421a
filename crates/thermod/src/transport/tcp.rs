//! TCP transport adapter.
//!
//! Stands in for the wireless socket service on hosts where the radio is
//! exposed as a network interface. The first bind fixes the port (port 0
//! resolves to an ephemeral one), and every reopen after a disconnect binds
//! that same endpoint so clients reconnect to a stable address.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use thermo_protocol::ServiceRecord;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info};

use super::{ClientSocket, ServerSocket, TransportError, WirelessAdapter};

/// Default listen endpoint
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:5150";

/// Upper bound on a single write to the client (10 seconds)
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Inbound bytes drained per liveness probe
const PROBE_BUFFER: usize = 64;

/// TCP implementation of [`WirelessAdapter`].
pub struct TcpAdapter {
    /// Endpoint to bind; updated with the real port after the first bind
    bind_addr: Mutex<SocketAddr>,

    enabled: AtomicBool,

    /// Friendly name, reported in logs when advertising
    name: Mutex<String>,
}

impl TcpAdapter {
    /// Creates a disabled adapter for `bind_addr`.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr: Mutex::new(bind_addr),
            enabled: AtomicBool::new(false),
            name: Mutex::new(String::new()),
        }
    }

    /// Returns the endpoint the next `listen` binds.
    pub fn bind_addr(&self) -> SocketAddr {
        match self.bind_addr.lock() {
            Ok(addr) => *addr,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Returns the friendly name last set.
    pub fn name(&self) -> String {
        match self.name.lock() {
            Ok(name) => name.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn pin_port(&self, local: SocketAddr) {
        if let Ok(mut addr) = self.bind_addr.lock() {
            if addr.port() == 0 {
                *addr = local;
            }
        }
    }
}

#[async_trait]
impl WirelessAdapter for TcpAdapter {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    fn enable(&self) -> Result<(), TransportError> {
        self.enabled.store(true, Ordering::Release);
        info!(addr = %self.bind_addr(), "Adapter enabled");
        Ok(())
    }

    fn disable(&self) -> Result<(), TransportError> {
        self.enabled.store(false, Ordering::Release);
        info!("Adapter disabled");
        Ok(())
    }

    fn set_name(&self, name: &str) -> Result<(), TransportError> {
        let mut current = self
            .name
            .lock()
            .map_err(|_| TransportError::Adapter("name lock poisoned".to_string()))?;
        *current = name.to_string();
        debug!(name, "Adapter name set");
        Ok(())
    }

    fn request_discoverable(&self, service: &ServiceRecord) {
        info!(
            name = %self.name(),
            service = %service,
            addr = %self.bind_addr(),
            "Advertising service"
        );
    }

    async fn listen(&self, service: &ServiceRecord) -> Result<Box<dyn ServerSocket>, TransportError> {
        if !self.is_enabled() {
            return Err(TransportError::AdapterDisabled);
        }

        let addr = self.bind_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| match source.kind() {
                io::ErrorKind::AddrNotAvailable => {
                    TransportError::AdapterUnavailable(format!("{addr}: {source}"))
                }
                _ => TransportError::Listen {
                    service: service.to_string(),
                    source,
                },
            })?;

        let local = listener
            .local_addr()
            .map_err(|source| TransportError::Listen {
                service: service.to_string(),
                source,
            })?;
        self.pin_port(local);

        debug!(addr = %local, service = %service, "Server socket open");
        Ok(Box::new(TcpServer {
            listener: Some(listener),
            local,
        }))
    }
}

/// Listening TCP socket.
pub struct TcpServer {
    listener: Option<TcpListener>,
    local: SocketAddr,
}

impl TcpServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }
}

#[async_trait]
impl ServerSocket for TcpServer {
    async fn accept(&mut self) -> Result<Box<dyn ClientSocket>, TransportError> {
        let listener = self.listener.as_ref().ok_or_else(|| {
            TransportError::Accept(io::Error::new(
                io::ErrorKind::NotConnected,
                "server socket closed",
            ))
        })?;

        let (stream, peer) = listener.accept().await.map_err(TransportError::Accept)?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
        }
        Ok(Box::new(TcpClient::new(stream, peer)))
    }

    fn close(&mut self) {
        if self.listener.take().is_some() {
            debug!(addr = %self.local, "Server socket closed");
        }
    }
}

/// Connected TCP client.
pub struct TcpClient {
    stream: Option<TcpStream>,
    peer: SocketAddr,
}

impl TcpClient {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream: Some(stream),
            peer,
        }
    }
}

#[async_trait]
impl ClientSocket for TcpClient {
    fn peer(&self) -> String {
        self.peer.to_string()
    }

    fn is_connected(&self) -> bool {
        let Some(stream) = self.stream.as_ref() else {
            return false;
        };

        // Clients never send anything meaningful, so inbound bytes are
        // drained and only EOF or a socket error count.
        let mut buf = [0u8; PROBE_BUFFER];
        match stream.try_read(&mut buf) {
            Ok(0) => false,
            Ok(_) => true,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => true,
            Err(_) => false,
        }
    }

    async fn send(&mut self, payload: &str) -> io::Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;

        let write = async {
            stream.write_all(payload.as_bytes()).await?;
            stream.flush().await
        };

        match timeout(WRITE_TIMEOUT, write).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "write timed out")),
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!(peer = %self.peer, error = %e, "Error shutting down client stream");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn loopback() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 0))
    }

    #[test]
    fn test_default_listen_addr_parses() {
        assert!(DEFAULT_LISTEN_ADDR.parse::<SocketAddr>().is_ok());
    }

    #[tokio::test]
    async fn test_disabled_adapter_refuses_to_listen() {
        let adapter = TcpAdapter::new(loopback());
        assert!(!adapter.is_enabled());

        let result = adapter.listen(&ServiceRecord::default()).await;
        assert!(matches!(result, Err(TransportError::AdapterDisabled)));
    }

    #[tokio::test]
    async fn test_first_bind_pins_port() {
        let adapter = TcpAdapter::new(loopback());
        adapter.enable().unwrap();
        adapter.set_name("Greenhouse").unwrap();
        assert_eq!(adapter.name(), "Greenhouse");

        let mut server = adapter.listen(&ServiceRecord::default()).await.unwrap();
        let pinned = adapter.bind_addr();
        assert_ne!(pinned.port(), 0);
        server.close();

        let mut again = adapter.listen(&ServiceRecord::default()).await.unwrap();
        assert_eq!(adapter.bind_addr(), pinned);
        again.close();
    }

    #[tokio::test]
    async fn test_accept_send_and_detect_close() {
        let adapter = TcpAdapter::new(loopback());
        adapter.enable().unwrap();
        let mut server = adapter.listen(&ServiceRecord::default()).await.unwrap();
        let addr = adapter.bind_addr();

        let peer = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let mut client = server.accept().await.unwrap();
        server.close();
        let mut remote = peer.await.unwrap();

        assert!(client.is_connected());
        client.send("68.0").await.unwrap();
        let mut buf = [0u8; 4];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"68.0");

        drop(remote);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while client.is_connected() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!client.is_connected());

        client.close().await;
        assert!(client.send("68.0").await.is_err());
    }

    #[tokio::test]
    async fn test_closed_server_rejects_accept() {
        let adapter = TcpAdapter::new(loopback());
        adapter.enable().unwrap();
        let mut server = adapter.listen(&ServiceRecord::default()).await.unwrap();
        server.close();
        server.close();

        assert!(matches!(server.accept().await, Err(TransportError::Accept(_))));
    }
}
