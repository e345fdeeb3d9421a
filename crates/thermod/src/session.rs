//! Session manager - owns the devices and both concurrent activities.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      SessionManager                           │
//! │  SessionState · DeviceProvider · WirelessAdapter              │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌─────────────────┐    ClientSlot     ┌──────────────────┐  │
//! │  │     Poller      │◀────(mutex)──────▶│     Listener     │  │
//! │  │ sensor, display │                   │  accept loop     │  │
//! │  └─────────────────┘                   └──────────────────┘  │
//! │          ▲                                      ▲            │
//! │          └────────── CancellationToken ─────────┘            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Teardown errors are logged and never abort the rest of the teardown

use std::sync::Arc;
use std::time::Duration;

use thermo_core::{DeviceError, DeviceProvider, DisplayHandle, SensorHandle, SessionState};
use thermo_protocol::{ServiceError, ServiceRecord};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::listener::{Listener, ListenerExit, ListenerState, ListenerTiming};
use crate::poller::{PollError, Poller, PollerExit, DEFAULT_POLL_INTERVAL};
use crate::slot::ClientSlot;
use crate::transport::{TransportError, WirelessAdapter};

/// Engine settings a session runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub poll_interval: Duration,
    pub service: ServiceRecord,
    pub listener: ListenerTiming,

    /// Switch the adapter off again during `stop()`
    pub disable_adapter_on_stop: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            service: ServiceRecord::default(),
            listener: ListenerTiming::default(),
            disable_adapter_on_stop: true,
        }
    }
}

/// Errors reported by the session manager.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session cannot start while {state}")]
    NotStopped { state: SessionState },

    #[error("Failed to open devices: {0}")]
    Device(#[from] DeviceError),

    #[error("Invalid service record: {0}")]
    Service(#[from] ServiceError),

    #[error("Session ended by poll failure: {0}")]
    Poll(#[from] PollError),
}

struct RunningSession {
    cancel: CancellationToken,
    slot: ClientSlot,
    poller: JoinHandle<PollerExit>,
    listener: Option<JoinHandle<ListenerExit>>,
    listener_state: Option<watch::Receiver<ListenerState>>,

    /// This session switched the adapter on, so stop may switch it off
    enabled_adapter: bool,
}

/// Starts and stops the polling engine.
pub struct SessionManager {
    config: SessionConfig,
    devices: Arc<dyn DeviceProvider>,

    /// `None` when the host has no adapter at all
    adapter: Option<Arc<dyn WirelessAdapter>>,

    state: watch::Sender<SessionState>,
    running: Option<RunningSession>,
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        devices: Arc<dyn DeviceProvider>,
        adapter: Option<Arc<dyn WirelessAdapter>>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Stopped);
        Self {
            config,
            devices,
            adapter,
            state,
            running: None,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Subscribes to lifecycle changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Listener state, if a listener was started for this session.
    pub fn listener_state(&self) -> Option<watch::Receiver<ListenerState>> {
        self.running.as_ref()?.listener_state.clone()
    }

    /// Returns true while a client occupies the slot.
    pub async fn has_client(&self) -> bool {
        match &self.running {
            Some(running) => running.slot.is_occupied().await,
            None => false,
        }
    }

    fn set_state(&self, next: SessionState) {
        let previous = self.state.send_replace(next);
        if !previous.can_transition_to(next) {
            warn!(from = %previous, to = %next, "Unexpected session transition");
        }
        debug!(from = %previous, to = %next, "Session state changed");
    }

    /// Opens the devices and starts polling and listening.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - `SessionError::NotStopped` unless the session is `Stopped`
    /// - `SessionError::Service` for an unusable service record
    /// - `SessionError::Device` if a device fails to open; anything already
    ///   opened is closed again and the session stays `Stopped`
    pub fn start(&mut self) -> Result<(), SessionError> {
        let state = self.state();
        if state != SessionState::Stopped {
            return Err(SessionError::NotStopped { state });
        }
        self.config.service.validate()?;

        self.set_state(SessionState::Starting);
        info!(service = %self.config.service, "Session starting");

        let (sensor, display) = match self.open_devices() {
            Ok(devices) => devices,
            Err(e) => {
                error!(error = %e, "Failed to open devices");
                self.set_state(SessionState::Stopped);
                return Err(e.into());
            }
        };

        let cancel = CancellationToken::new();
        let slot = ClientSlot::new();

        let (adapter, enabled_adapter) = match self.bring_up_adapter() {
            Some((adapter, enabled)) => (Some(adapter), enabled),
            None => (None, false),
        };
        let (listener, listener_state) = match adapter {
            Some(adapter) => {
                let listener = Listener::new(
                    adapter,
                    self.config.service.clone(),
                    slot.clone(),
                    self.config.listener,
                    cancel.clone(),
                );
                let state = listener.subscribe();
                (Some(tokio::spawn(listener.run())), Some(state))
            }
            None => {
                info!("Running without a listener, readings stay local");
                (None, None)
            }
        };

        let poller = Poller::new(sensor, display, slot.clone());
        let poller = tokio::spawn(poller.run(self.config.poll_interval, cancel.clone()));

        self.running = Some(RunningSession {
            cancel,
            slot,
            poller,
            listener,
            listener_state,
            enabled_adapter,
        });
        self.set_state(SessionState::Running);
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Session running"
        );
        Ok(())
    }

    /// Acquires both devices. A handle opened before a later failure is
    /// released when it drops.
    fn open_devices(&self) -> Result<(SensorHandle, DisplayHandle), DeviceError> {
        let sensor = SensorHandle::new(self.devices.open_sensor()?);
        let mut display = DisplayHandle::new(self.devices.open_display()?);
        display.set_enabled(true)?;
        Ok((sensor, display))
    }

    /// Enables and names the adapter, then advertises the service once.
    /// Any failure puts the session in degraded mode.
    ///
    /// The flag is true when the adapter was off and this call enabled it.
    fn bring_up_adapter(&self) -> Option<(Arc<dyn WirelessAdapter>, bool)> {
        let Some(adapter) = self.adapter.clone() else {
            info!("No wireless adapter available");
            return None;
        };

        match prepare_adapter(adapter.as_ref(), &self.config.service.name) {
            Ok(enabled) => {
                adapter.request_discoverable(&self.config.service);
                Some((adapter, enabled))
            }
            Err(e) => {
                warn!(error = %e, "Adapter unusable, broadcasting disabled");
                None
            }
        }
    }

    /// Resolves once the running session has been cancelled, either by
    /// `stop()` or by a fatal poll error. Resolves immediately when idle.
    pub async fn terminated(&self) {
        if let Some(running) = &self.running {
            running.cancel.cancelled().await;
        }
    }

    /// Stops polling and listening and releases every resource.
    ///
    /// Teardown order: client socket, server socket, display (clear,
    /// disable, close), sensor, adapter. Safe to call repeatedly and after a
    /// failed `start()`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Poll` when a poll failure ended the session.
    /// The teardown itself still completes.
    pub async fn stop(&mut self) -> Result<(), SessionError> {
        let Some(running) = self.running.take() else {
            debug!("Stop requested with no running session");
            return Ok(());
        };

        self.set_state(SessionState::Stopping);
        info!("Session stopping");
        running.cancel.cancel();

        if running.slot.close().await {
            debug!("Client socket closed");
        }

        if let Some(listener) = running.listener {
            match listener.await {
                Ok(exit) => debug!(?exit, "Listener joined"),
                Err(e) => warn!(error = %e, "Listener task failed"),
            }
        }

        let failure = match running.poller.await {
            Ok(PollerExit { poller, error }) => {
                let (sensor, display) = poller.into_devices();
                close_devices(sensor, display);
                error
            }
            Err(e) => {
                // The task's devices were dropped with it and closed on drop.
                warn!(error = %e, "Poller task failed");
                None
            }
        };

        if running.enabled_adapter && self.config.disable_adapter_on_stop {
            if let Some(adapter) = &self.adapter {
                if let Err(e) = adapter.disable() {
                    warn!(error = %e, "Failed to disable adapter");
                }
            }
        }

        self.set_state(SessionState::Stopped);
        info!("Session stopped");

        match failure {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

/// Returns true if the adapter had to be enabled.
fn prepare_adapter(adapter: &dyn WirelessAdapter, name: &str) -> Result<bool, TransportError> {
    let was_enabled = adapter.is_enabled();
    if !was_enabled {
        adapter.enable()?;
    }
    if let Err(e) = adapter.set_name(name) {
        if !was_enabled {
            if let Err(undo) = adapter.disable() {
                warn!(error = %undo, "Failed to disable adapter after setup failure");
            }
        }
        return Err(e);
    }
    Ok(!was_enabled)
}

fn close_devices(mut sensor: SensorHandle, mut display: DisplayHandle) {
    if let Err(e) = display.close() {
        warn!(error = %e, "Failed to close display");
    }
    if let Err(e) = sensor.close() {
        warn!(error = %e, "Failed to close sensor");
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        // Without an explicit stop the tasks still wind down; their devices
        // close when the poller task drops them.
        if let Some(running) = &self.running {
            running.cancel.cancel();
        }
    }
}
