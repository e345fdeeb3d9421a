//! Periodic read–render–broadcast loop.
//!
//! One tick reads the sensor, converts the sample, renders it, applies the
//! display-hygiene policy and offers the text to the client slot. Ticks run
//! strictly one after another; the delay between them is the only
//! suspension point besides the send itself.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Device failures are returned as `PollError`, never swallowed

use std::time::Duration;

use thermo_core::{DeviceError, DisplayHandle, Reading, SensorHandle};
use thermo_protocol::encode_reading;
use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::slot::{ClientSlot, Delivery};

/// Poll period of the reference deployment.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Renders between display clears.
pub const RENDERS_PER_CLEAR: u8 = 2;

/// Result of a single tick.
#[derive(Debug)]
pub struct TickReport {
    pub reading: Reading,

    /// Text rendered and sent
    pub text: String,

    /// Whether this tick blanked the display after rendering
    pub cleared: bool,

    pub delivery: Delivery,
}

/// Failures that end the session.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("Sensor read failed: {0}")]
    Sensor(#[source] DeviceError),

    #[error("Display update failed: {0}")]
    Display(#[source] DeviceError),
}

/// Owns the session's devices while it runs.
pub struct Poller {
    sensor: SensorHandle,
    display: DisplayHandle,
    slot: ClientSlot,

    /// Renders since the display was last cleared
    renders_since_clear: u8,

    ticks: u64,

    /// Interrupts a pending client write on shutdown
    cancel: CancellationToken,
}

impl Poller {
    pub fn new(sensor: SensorHandle, display: DisplayHandle, slot: ClientSlot) -> Self {
        Self {
            sensor,
            display,
            slot,
            renders_since_clear: 0,
            ticks: 0,
            cancel: CancellationToken::new(),
        }
    }

    /// Number of completed ticks.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Runs one read–render–broadcast cycle.
    ///
    /// # Errors
    ///
    /// Sensor and display failures are returned and end the session. A
    /// failed client write is not an error; it shows up as
    /// `Delivery::Dropped` in the report.
    pub async fn tick(&mut self) -> Result<TickReport, PollError> {
        let celsius = self.sensor.read_celsius().map_err(PollError::Sensor)?;
        let reading = Reading::from_celsius(celsius);
        let text = reading.display_text();

        self.display.render(&text).map_err(PollError::Display)?;
        let cleared = self.after_render()?;

        let delivery = self
            .slot
            .send_until(&encode_reading(&reading), &self.cancel)
            .await;
        self.ticks += 1;

        match &delivery {
            Delivery::Sent => debug!(text = %text, cleared, "Tick sent to client"),
            Delivery::NoClient => debug!(text = %text, cleared, "Tick rendered, no client"),
            Delivery::Dropped(e) => warn!(error = %e, "Client write failed, slot cleared"),
            Delivery::Interrupted => debug!(text = %text, "Client write interrupted by shutdown"),
        }

        Ok(TickReport {
            reading,
            text,
            cleared,
            delivery,
        })
    }

    /// Display hygiene: blank the display after every second render.
    fn after_render(&mut self) -> Result<bool, PollError> {
        self.renders_since_clear += 1;
        if self.renders_since_clear < RENDERS_PER_CLEAR {
            return Ok(false);
        }

        self.renders_since_clear = 0;
        self.display.clear().map_err(PollError::Display)?;
        Ok(true)
    }

    /// Ticks immediately, then every `period`, until cancelled or a tick
    /// fails. A failing tick cancels `cancel` so the rest of the session
    /// winds down with it.
    pub async fn run(mut self, period: Duration, cancel: CancellationToken) -> PollerExit {
        info!(period_ms = period.as_millis() as u64, "Poller started");
        self.cancel = cancel.clone();

        loop {
            if let Err(e) = self.tick().await {
                error!(error = %e, ticks = self.ticks, "Tick failed, ending session");
                cancel.cancel();
                return PollerExit {
                    poller: self,
                    error: Some(e),
                };
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                _ = sleep(period) => {}
            }
        }

        debug!(ticks = self.ticks, "Poller stopped");
        PollerExit {
            poller: self,
            error: None,
        }
    }

    /// Hands the devices back to the owner for an ordered shutdown.
    pub fn into_devices(self) -> (SensorHandle, DisplayHandle) {
        (self.sensor, self.display)
    }
}

/// What the poller task returns when it ends.
pub struct PollerExit {
    pub poller: Poller,

    /// The failure that ended the loop, if it did not end by cancellation
    pub error: Option<PollError>,
}
