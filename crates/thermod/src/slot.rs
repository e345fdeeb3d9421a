//! The single shared client slot.
//!
//! The slot is the only mutable state the Poller and the Listener share.
//! Every operation takes the lock once and does its check and its action
//! under it, so a send can never observe a handle the Listener is halfway
//! through replacing, and an eviction can never race a send.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - A failed write closes and removes the occupant instead of erroring

use std::io;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::transport::ClientSocket;

/// Outcome of offering a payload to the slot.
#[derive(Debug)]
pub enum Delivery {
    /// Nobody is connected.
    NoClient,
    /// The occupant accepted the payload.
    Sent,
    /// The write failed; the occupant was closed and removed.
    Dropped(io::Error),
    /// Shutdown cut the write short; the occupant is left for `close()`.
    Interrupted,
}

impl Delivery {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }
}

struct SlotInner {
    occupant: Mutex<Option<Box<dyn ClientSocket>>>,
    vacated: Notify,
}

/// Cheap-to-clone handle to the slot.
#[derive(Clone)]
pub struct ClientSlot {
    inner: Arc<SlotInner>,
}

impl ClientSlot {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SlotInner {
                occupant: Mutex::new(None),
                vacated: Notify::new(),
            }),
        }
    }

    /// Installs a freshly accepted client.
    ///
    /// # Errors
    ///
    /// Hands the client back if the slot is already occupied; the caller
    /// decides how to dispose of it.
    pub async fn install(&self, client: Box<dyn ClientSocket>) -> Result<(), Box<dyn ClientSocket>> {
        let mut occupant = self.inner.occupant.lock().await;
        if occupant.is_some() {
            return Err(client);
        }
        debug!(peer = %client.peer(), "Client installed in slot");
        *occupant = Some(client);
        Ok(())
    }

    pub async fn is_occupied(&self) -> bool {
        self.inner.occupant.lock().await.is_some()
    }

    /// Returns the occupant's peer description.
    pub async fn peer(&self) -> Option<String> {
        self.inner.occupant.lock().await.as_ref().map(|c| c.peer())
    }

    /// Sends `payload` to the occupant, if any.
    ///
    /// A failed write is not retried. The occupant is closed and removed
    /// while the lock is still held, then the Listener is woken so it can
    /// resume accepting.
    pub async fn send(&self, payload: &str) -> Delivery {
        let mut occupant = self.inner.occupant.lock().await;
        let Some(client) = occupant.as_mut() else {
            return Delivery::NoClient;
        };

        match client.send(payload).await {
            Ok(()) => Delivery::Sent,
            Err(e) => {
                if let Some(mut dead) = occupant.take() {
                    debug!(peer = %dead.peer(), error = %e, "Send failed, dropping client");
                    dead.close().await;
                }
                drop(occupant);
                self.inner.vacated.notify_one();
                Delivery::Dropped(e)
            }
        }
    }

    /// Like [`send`](Self::send), but gives up as soon as `cancel` fires.
    ///
    /// The lock is released with the abandoned write, so a shutdown never
    /// waits out a stalled client's write timeout.
    pub async fn send_until(&self, payload: &str, cancel: &CancellationToken) -> Delivery {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => Delivery::Interrupted,

            delivery = self.send(payload) => delivery,
        }
    }

    /// Removes the occupant if it reports itself disconnected.
    ///
    /// Returns true when the slot is empty afterwards.
    pub async fn evict_if_disconnected(&self) -> bool {
        let mut occupant = self.inner.occupant.lock().await;
        let connected = match occupant.as_ref() {
            None => return true,
            Some(client) => client.is_connected(),
        };
        if connected {
            return false;
        }

        if let Some(mut dead) = occupant.take() {
            debug!(peer = %dead.peer(), "Client no longer connected, evicting");
            dead.close().await;
        }
        true
    }

    /// Closes and removes the occupant. Returns true if there was one.
    pub async fn close(&self) -> bool {
        let mut occupant = self.inner.occupant.lock().await;
        match occupant.take() {
            Some(mut client) => {
                debug!(peer = %client.peer(), "Closing client");
                client.close().await;
                true
            }
            None => false,
        }
    }

    /// Waits until a send drops the occupant.
    ///
    /// A drop that happened while nobody was waiting is remembered, so a
    /// waiter may also wake for an occupant that is already gone; callers
    /// re-check the slot after waking.
    pub async fn vacated(&self) {
        self.inner.vacated.notified().await;
    }
}

impl Default for ClientSlot {
    fn default() -> Self {
        Self::new()
    }
}
