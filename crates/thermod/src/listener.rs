//! Single-client connection state machine.
//!
//! ```text
//!          ┌────────┐  listen()   ┌───────────┐  accept()   ┌───────────┐
//!   ──────▶│  Idle  │────────────▶│ Listening │────────────▶│ Connected │
//!          └────────┘             └───────────┘             └─────┬─────┘
//!              ▲                  server socket closed            │
//!              │                  right after the accept          │
//!              └──────────────────────────────────────────────────┘
//!                 send failed / liveness check failed, slot cleared
//!
//!   any state ──cancel / adapter lost──▶ Closed
//! ```
//!
//! The Listener runs as its own task so a pending accept never delays a
//! tick. It shares nothing with the Poller except the `ClientSlot`.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Transport errors are logged and retried, or end the task in degraded mode

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thermo_protocol::ServiceRecord;
use tokio::sync::watch;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::slot::ClientSlot;
use crate::transport::{ServerSocket, WirelessAdapter};

/// Backoff after a failed listen or accept.
pub const DEFAULT_ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// Pause between a disconnect and reopening the server socket.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(500);

/// How often a connected client is probed for liveness.
pub const DEFAULT_LIVENESS_INTERVAL: Duration = Duration::from_secs(1);

/// Where the accept loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerState {
    Idle,
    Listening,
    Connected,
    Closed,
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Connected => "connected",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Delays used by the accept loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerTiming {
    pub accept_backoff: Duration,
    pub reconnect_delay: Duration,
    pub liveness_interval: Duration,
}

impl Default for ListenerTiming {
    fn default() -> Self {
        Self {
            accept_backoff: DEFAULT_ACCEPT_BACKOFF,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            liveness_interval: DEFAULT_LIVENESS_INTERVAL,
        }
    }
}

/// Why the accept loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerExit {
    /// Session shutdown
    Cancelled,
    /// The adapter is permanently unavailable; broadcasting is off
    Degraded,
}

enum Step<T> {
    Ready(T),
    Retry,
    Degrade,
    Cancelled,
}

/// Accept loop for the single client.
pub struct Listener {
    adapter: Arc<dyn WirelessAdapter>,
    service: ServiceRecord,
    slot: ClientSlot,
    timing: ListenerTiming,
    cancel: CancellationToken,
    state: watch::Sender<ListenerState>,
}

impl Listener {
    pub fn new(
        adapter: Arc<dyn WirelessAdapter>,
        service: ServiceRecord,
        slot: ClientSlot,
        timing: ListenerTiming,
        cancel: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(ListenerState::Idle);
        Self {
            adapter,
            service,
            slot,
            timing,
            cancel,
            state,
        }
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: ListenerState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "Listener state changed");
        }
    }

    /// Runs until cancelled or the adapter is permanently gone.
    pub async fn run(self) -> ListenerExit {
        info!(service = %self.service, "Listener started");
        let exit = self.accept_loop().await;

        // Both exits are terminal.
        self.slot.close().await;
        self.set_state(ListenerState::Closed);
        info!(?exit, "Listener stopped");
        exit
    }

    async fn accept_loop(&self) -> ListenerExit {
        loop {
            self.set_state(ListenerState::Idle);

            let mut server = match self.open_server().await {
                Step::Ready(server) => server,
                Step::Retry => {
                    if self.pause(self.timing.accept_backoff).await {
                        continue;
                    }
                    return ListenerExit::Cancelled;
                }
                Step::Degrade => return ListenerExit::Degraded,
                Step::Cancelled => return ListenerExit::Cancelled,
            };

            self.set_state(ListenerState::Listening);
            let accepted = tokio::select! {
                biased;

                _ = self.cancel.cancelled() => None,

                result = server.accept() => Some(result),
            };

            // Single-client policy: no server socket outlives an accept, so
            // a second client cannot connect while one is active.
            server.close();

            let client = match accepted {
                None => return ListenerExit::Cancelled,
                Some(Ok(client)) => client,
                Some(Err(e)) if e.is_permanent() => {
                    warn!(error = %e, "Adapter lost, broadcasting disabled");
                    return ListenerExit::Degraded;
                }
                Some(Err(e)) => {
                    warn!(
                        error = %e,
                        backoff_ms = self.timing.accept_backoff.as_millis() as u64,
                        "Accept failed, retrying"
                    );
                    if self.pause(self.timing.accept_backoff).await {
                        continue;
                    }
                    return ListenerExit::Cancelled;
                }
            };

            if self.cancel.is_cancelled() {
                let mut client = client;
                client.close().await;
                return ListenerExit::Cancelled;
            }

            let peer = client.peer();
            if let Err(mut rejected) = self.slot.install(client).await {
                warn!(peer = %peer, "Slot already occupied, closing new client");
                rejected.close().await;
            } else {
                info!(peer = %peer, "Client connected");
            }
            self.set_state(ListenerState::Connected);

            if !self.wait_for_disconnect().await {
                return ListenerExit::Cancelled;
            }
            info!(peer = %peer, "Client disconnected, resuming listening");

            if !self.pause(self.timing.reconnect_delay).await {
                return ListenerExit::Cancelled;
            }
        }
    }

    async fn open_server(&self) -> Step<Box<dyn ServerSocket>> {
        let result = tokio::select! {
            biased;

            _ = self.cancel.cancelled() => return Step::Cancelled,

            result = self.adapter.listen(&self.service) => result,
        };

        match result {
            Ok(server) => Step::Ready(server),
            Err(e) if e.is_permanent() => {
                warn!(error = %e, "Adapter unavailable, broadcasting disabled");
                Step::Degrade
            }
            Err(e) => {
                warn!(
                    error = %e,
                    backoff_ms = self.timing.accept_backoff.as_millis() as u64,
                    "Failed to open server socket, retrying"
                );
                Step::Retry
            }
        }
    }

    /// Waits until the slot empties. Returns false if cancelled first.
    async fn wait_for_disconnect(&self) -> bool {
        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => return false,

                _ = self.slot.vacated() => {}

                _ = sleep(self.timing.liveness_interval) => {}
            }

            if self.slot.evict_if_disconnected().await {
                return true;
            }
        }
    }

    /// Sleeps for `delay`. Returns false if cancelled first.
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            biased;

            _ = self.cancel.cancelled() => false,

            _ = sleep(delay) => true,
        }
    }
}
