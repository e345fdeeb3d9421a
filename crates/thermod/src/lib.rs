//! thermo Daemon - Sensor polling and single-client broadcast engine
//!
//! This crate provides the engine behind the `thermod` binary:
//! - `session` - `SessionManager`, owner of the devices and both tasks
//! - `poller` - periodic read, render and broadcast
//! - `listener` - single-client accept state machine
//! - `slot` - the one piece of state the two tasks share
//! - `transport` - adapter/server/client socket traits and the TCP adapter
//! - `devices` - sysfs sensor and console display for Linux hosts
//! - `config` - TOML + environment configuration
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       thermod daemon                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐            ┌─────────────────────────┐ │
//! │  │     Poller      │            │        Listener         │ │
//! │  │ read → render   │            │  listen → accept →      │ │
//! │  │   → send        │            │  close server socket    │ │
//! │  └────────┬────────┘            └────────────┬────────────┘ │
//! │           │                                  │              │
//! │           │  send / evict      install/evict │              │
//! │           ▼                                  ▼              │
//! │        ┌────────────────────────────────────────┐           │
//! │        │     ClientSlot (Mutex<Option<...>>)    │           │
//! │        └────────────────────────────────────────┘           │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Task and channel failures are logged, never propagated as panics

pub mod config;
pub mod devices;
pub mod listener;
pub mod poller;
pub mod session;
pub mod slot;
pub mod transport;

pub use config::{ConfigError, DaemonConfig};
pub use listener::{Listener, ListenerExit, ListenerState, ListenerTiming};
pub use poller::{PollError, Poller, PollerExit, TickReport};
pub use session::{SessionConfig, SessionError, SessionManager};
pub use slot::{ClientSlot, Delivery};
pub use transport::{ClientSocket, ServerSocket, TcpAdapter, TransportError, WirelessAdapter};
