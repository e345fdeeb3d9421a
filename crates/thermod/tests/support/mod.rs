//! In-memory collaborators for the integration tests.
//!
//! Per the project policy, tests CAN use `.unwrap()` and `.expect()`.

#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use thermo_core::{DeviceError, DeviceProvider, DeviceResult, DisplaySink, SensorSource};
use thermo_protocol::ServiceRecord;
use thermod::transport::{ClientSocket, ServerSocket, TransportError, WirelessAdapter};
use thermod::ListenerTiming;
use tokio::sync::{mpsc, watch};

// ============================================================================
// Constants
// ============================================================================

/// Upper bound for anything a test waits on
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Listener timing short enough for tests
pub const FAST_TIMING: ListenerTiming = ListenerTiming {
    accept_backoff: Duration::from_millis(20),
    reconnect_delay: Duration::from_millis(10),
    liveness_interval: Duration::from_millis(20),
};

/// Waits until the watch value satisfies `pred`.
pub async fn wait_for<T, F>(rx: &mut watch::Receiver<T>, pred: F) -> T
where
    T: Clone,
    F: Fn(&T) -> bool,
{
    tokio::time::timeout(WAIT_TIMEOUT, rx.wait_for(|value| pred(value)))
        .await
        .expect("timed out waiting for state")
        .expect("state channel closed")
        .clone()
}

/// Polls `check` until it returns true.
pub async fn eventually<F>(mut check: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within {WAIT_TIMEOUT:?}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ============================================================================
// Devices
// ============================================================================

/// Shared record of every device call, in order.
#[derive(Clone, Default)]
pub struct DeviceLog(Arc<Mutex<Vec<String>>>);

impl DeviceLog {
    fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    pub fn rendered(&self) -> Vec<String> {
        self.events()
            .iter()
            .filter_map(|e| e.strip_prefix("render ").map(str::to_string))
            .collect()
    }
}

/// Device provider backed by a settable temperature.
pub struct FakeDevices {
    pub log: DeviceLog,
    celsius: Arc<Mutex<Option<f32>>>,
    fail_display_open: AtomicBool,
    display_faults: Arc<DisplayFaults>,
}

/// Switches that make the display's calls fail.
#[derive(Default)]
struct DisplayFaults {
    render: AtomicBool,
    clear: AtomicBool,
}

fn stuck_display() -> DeviceError {
    DeviceError::InvalidData {
        device: "display",
        reason: "stuck segment".into(),
    }
}

impl FakeDevices {
    pub fn new(celsius: f32) -> Arc<Self> {
        Arc::new(Self {
            log: DeviceLog::default(),
            celsius: Arc::new(Mutex::new(Some(celsius))),
            fail_display_open: AtomicBool::new(false),
            display_faults: Arc::default(),
        })
    }

    /// `None` makes the next read fail.
    pub fn set_celsius(&self, celsius: Option<f32>) {
        *self.celsius.lock().unwrap() = celsius;
    }

    pub fn fail_display_open(&self) {
        self.fail_display_open.store(true, Ordering::SeqCst);
    }

    /// Every further render fails.
    pub fn fail_render(&self) {
        self.display_faults.render.store(true, Ordering::SeqCst);
    }

    /// Every further clear fails.
    pub fn fail_clear(&self) {
        self.display_faults.clear.store(true, Ordering::SeqCst);
    }
}

impl DeviceProvider for FakeDevices {
    fn open_sensor(&self) -> DeviceResult<Box<dyn SensorSource>> {
        self.log.push("sensor.open");
        Ok(Box::new(FakeSensor {
            log: self.log.clone(),
            celsius: self.celsius.clone(),
        }))
    }

    fn open_display(&self) -> DeviceResult<Box<dyn DisplaySink>> {
        if self.fail_display_open.load(Ordering::SeqCst) {
            return Err(DeviceError::Open {
                device: "display",
                reason: "no such device".into(),
            });
        }
        self.log.push("display.open");
        Ok(Box::new(FakeDisplay {
            log: self.log.clone(),
            faults: self.display_faults.clone(),
        }))
    }
}

struct FakeSensor {
    log: DeviceLog,
    celsius: Arc<Mutex<Option<f32>>>,
}

impl SensorSource for FakeSensor {
    fn read_celsius(&mut self) -> DeviceResult<f32> {
        self.log.push("sensor.read");
        self.celsius
            .lock()
            .unwrap()
            .ok_or_else(|| DeviceError::io("sensor", io::Error::from(io::ErrorKind::TimedOut)))
    }

    fn close(&mut self) -> DeviceResult<()> {
        self.log.push("sensor.close");
        Ok(())
    }
}

struct FakeDisplay {
    log: DeviceLog,
    faults: Arc<DisplayFaults>,
}

impl DisplaySink for FakeDisplay {
    fn render(&mut self, text: &str) -> DeviceResult<()> {
        if self.faults.render.load(Ordering::SeqCst) {
            return Err(stuck_display());
        }
        self.log.push(format!("render {text}"));
        Ok(())
    }

    fn clear(&mut self) -> DeviceResult<()> {
        if self.faults.clear.load(Ordering::SeqCst) {
            return Err(stuck_display());
        }
        self.log.push("clear");
        Ok(())
    }

    fn set_enabled(&mut self, enabled: bool) -> DeviceResult<()> {
        self.log.push(format!("enabled {enabled}"));
        Ok(())
    }

    fn close(&mut self) -> DeviceResult<()> {
        self.log.push("display.close");
        Ok(())
    }
}

// ============================================================================
// Client sockets
// ============================================================================

/// Test-side view of a fake client connection.
#[derive(Default)]
pub struct PeerState {
    inbox: Mutex<Vec<String>>,
    disconnected: AtomicBool,
    fail_writes: AtomicBool,
    closes: AtomicUsize,
    /// Sends made after the socket was closed
    stale_sends: AtomicUsize,
    stalled: AtomicBool,
    stalled_sends: AtomicUsize,
}

#[derive(Clone)]
pub struct Peer(Arc<PeerState>);

impl Peer {
    pub fn received(&self) -> Vec<String> {
        self.0.inbox.lock().unwrap().clone()
    }

    /// Simulates the remote side going away silently.
    pub fn hang_up(&self) {
        self.0.disconnected.store(true, Ordering::SeqCst);
    }

    /// Makes every further write fail with a reset.
    pub fn break_pipe(&self) {
        self.0.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Makes every further write hang forever.
    pub fn stall(&self) {
        self.0.stalled.store(true, Ordering::SeqCst);
    }

    /// Writes currently hanging on a stalled peer.
    pub fn stalled_sends(&self) -> usize {
        self.0.stalled_sends.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.0.closes.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closes() > 0
    }

    pub fn stale_sends(&self) -> usize {
        self.0.stale_sends.load(Ordering::SeqCst)
    }
}

pub struct FakeClient {
    name: String,
    state: Arc<PeerState>,
}

/// Creates a connected client and the handle tests observe it through.
pub fn fake_client(name: &str) -> (FakeClient, Peer) {
    let state = Arc::new(PeerState::default());
    (
        FakeClient {
            name: name.to_string(),
            state: state.clone(),
        },
        Peer(state),
    )
}

#[async_trait]
impl ClientSocket for FakeClient {
    fn peer(&self) -> String {
        self.name.clone()
    }

    fn is_connected(&self) -> bool {
        !self.state.disconnected.load(Ordering::SeqCst) && self.state.closes.load(Ordering::SeqCst) == 0
    }

    async fn send(&mut self, payload: &str) -> io::Result<()> {
        if self.state.closes.load(Ordering::SeqCst) > 0 {
            self.state.stale_sends.fetch_add(1, Ordering::SeqCst);
            return Err(io::Error::from(io::ErrorKind::NotConnected));
        }
        if self.state.stalled.load(Ordering::SeqCst) {
            self.state.stalled_sends.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
        }
        if self.state.fail_writes.load(Ordering::SeqCst) || self.state.disconnected.load(Ordering::SeqCst) {
            return Err(io::Error::from(io::ErrorKind::ConnectionReset));
        }
        self.state.inbox.lock().unwrap().push(payload.to_string());
        Ok(())
    }

    async fn close(&mut self) {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Adapter
// ============================================================================

/// Adapter whose server sockets hand out queued fake clients.
pub struct FakeAdapter {
    incoming_tx: mpsc::UnboundedSender<FakeClient>,
    incoming_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<FakeClient>>>,
    enabled: AtomicBool,
    unavailable: AtomicBool,
    fail_listens: AtomicUsize,
    accept_faults: Arc<AcceptFaults>,
    name: Mutex<String>,
    listens: AtomicUsize,
    open_servers: Arc<AtomicUsize>,
    discoverable_requests: AtomicUsize,
    disables: AtomicUsize,
}

impl FakeAdapter {
    pub fn new() -> Arc<Self> {
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            incoming_tx,
            incoming_rx: Arc::new(tokio::sync::Mutex::new(incoming_rx)),
            enabled: AtomicBool::new(false),
            unavailable: AtomicBool::new(false),
            fail_listens: AtomicUsize::new(0),
            accept_faults: Arc::default(),
            name: Mutex::new(String::new()),
            listens: AtomicUsize::new(0),
            open_servers: Arc::new(AtomicUsize::new(0)),
            discoverable_requests: AtomicUsize::new(0),
            disables: AtomicUsize::new(0),
        })
    }

    /// Queues a client for the next accept.
    pub fn connect(&self, name: &str) -> Peer {
        let (client, peer) = fake_client(name);
        self.incoming_tx.send(client).ok().expect("adapter dropped");
        peer
    }

    /// Every further listen fails permanently.
    pub fn remove(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }

    /// The next `n` listens fail transiently.
    pub fn fail_next_listens(&self, n: usize) {
        self.fail_listens.store(n, Ordering::SeqCst);
    }

    /// The next `n` accepts fail transiently.
    pub fn fail_next_accepts(&self, n: usize) {
        self.accept_faults.transient.store(n, Ordering::SeqCst);
    }

    /// Every further accept reports the adapter gone.
    pub fn lose_during_accept(&self) {
        self.accept_faults.adapter_lost.store(true, Ordering::SeqCst);
    }

    pub fn listens(&self) -> usize {
        self.listens.load(Ordering::SeqCst)
    }

    pub fn open_servers(&self) -> usize {
        self.open_servers.load(Ordering::SeqCst)
    }

    pub fn name(&self) -> String {
        self.name.lock().unwrap().clone()
    }

    pub fn discoverable_requests(&self) -> usize {
        self.discoverable_requests.load(Ordering::SeqCst)
    }

    pub fn disables(&self) -> usize {
        self.disables.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WirelessAdapter for FakeAdapter {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn enable(&self) -> Result<(), TransportError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TransportError::AdapterUnavailable("removed".into()));
        }
        self.enabled.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn disable(&self) -> Result<(), TransportError> {
        self.enabled.store(false, Ordering::SeqCst);
        self.disables.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_name(&self, name: &str) -> Result<(), TransportError> {
        *self.name.lock().unwrap() = name.to_string();
        Ok(())
    }

    fn request_discoverable(&self, _service: &ServiceRecord) {
        self.discoverable_requests.fetch_add(1, Ordering::SeqCst);
    }

    async fn listen(&self, _service: &ServiceRecord) -> Result<Box<dyn ServerSocket>, TransportError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TransportError::AdapterUnavailable("removed".into()));
        }
        let pending = self.fail_listens.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_listens.store(pending - 1, Ordering::SeqCst);
            return Err(TransportError::Listen {
                service: "test".into(),
                source: io::Error::from(io::ErrorKind::AddrInUse),
            });
        }

        self.listens.fetch_add(1, Ordering::SeqCst);
        self.open_servers.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeServer {
            incoming: self.incoming_rx.clone(),
            faults: self.accept_faults.clone(),
            open_servers: self.open_servers.clone(),
            closed: false,
        }))
    }
}

#[derive(Default)]
struct AcceptFaults {
    transient: AtomicUsize,
    adapter_lost: AtomicBool,
}

struct FakeServer {
    incoming: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<FakeClient>>>,
    faults: Arc<AcceptFaults>,
    open_servers: Arc<AtomicUsize>,
    closed: bool,
}

#[async_trait]
impl ServerSocket for FakeServer {
    async fn accept(&mut self) -> Result<Box<dyn ClientSocket>, TransportError> {
        if self.closed {
            return Err(TransportError::Accept(io::Error::from(io::ErrorKind::NotConnected)));
        }
        if self.faults.adapter_lost.load(Ordering::SeqCst) {
            return Err(TransportError::AdapterUnavailable("removed".into()));
        }
        let pending = self.faults.transient.load(Ordering::SeqCst);
        if pending > 0 {
            self.faults.transient.store(pending - 1, Ordering::SeqCst);
            return Err(TransportError::Accept(io::Error::from(io::ErrorKind::ConnectionAborted)));
        }
        let mut incoming = self.incoming.lock().await;
        match incoming.recv().await {
            Some(client) => Ok(Box::new(client)),
            None => Err(TransportError::Accept(io::Error::from(io::ErrorKind::BrokenPipe))),
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.open_servers.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.close();
    }
}
