//! Daemon configuration.
//!
//! Sources, later ones winning:
//! 1. Built-in defaults
//! 2. A TOML file: the explicit path if given, else
//!    `$XDG_CONFIG_HOME/thermo/thermod.toml` when it exists
//! 3. Environment: `THERMOD_LISTEN`, `THERMOD_SENSOR`, `THERMOD_POLL_MS`
//!
//! ```toml
//! poll_interval_ms = 10000
//! listen_addr = "0.0.0.0:5150"
//! sensor_path = "/sys/class/thermal/thermal_zone0/temp"
//!
//! [service]
//! name = "Temperature Monitor IoT"
//! uuid = "4e5d48e0-75df-11e3-981f-0800200c9a66"
//! ```

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thermo_protocol::{ServiceError, ServiceRecord};
use thiserror::Error;
use tracing::debug;

use crate::devices::DEFAULT_SENSOR_PATH;
use crate::listener::{
    ListenerTiming, DEFAULT_ACCEPT_BACKOFF, DEFAULT_LIVENESS_INTERVAL, DEFAULT_RECONNECT_DELAY,
};
use crate::poller::DEFAULT_POLL_INTERVAL;
use crate::session::SessionConfig;
use crate::transport::DEFAULT_LISTEN_ADDR;

/// Overrides the listen address
pub const ENV_LISTEN: &str = "THERMOD_LISTEN";

/// Overrides the sensor path
pub const ENV_SENSOR: &str = "THERMOD_SENSOR";

/// Overrides the poll interval, in milliseconds
pub const ENV_POLL_MS: &str = "THERMOD_POLL_MS";

/// Config file name inside the `thermo` config directory
pub const CONFIG_FILE_NAME: &str = "thermod.toml";

/// Everything the daemon reads at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    pub poll_interval_ms: u64,
    pub service: ServiceRecord,
    pub listen_addr: SocketAddr,
    pub sensor_path: PathBuf,
    pub accept_backoff_ms: u64,
    pub reconnect_delay_ms: u64,
    pub liveness_interval_ms: u64,

    /// Start the listener at all
    pub wireless: bool,

    pub disable_adapter_on_stop: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            service: ServiceRecord::default(),
            listen_addr: default_listen_addr(),
            sensor_path: PathBuf::from(DEFAULT_SENSOR_PATH),
            accept_backoff_ms: DEFAULT_ACCEPT_BACKOFF.as_millis() as u64,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY.as_millis() as u64,
            liveness_interval_ms: DEFAULT_LIVENESS_INTERVAL.as_millis() as u64,
            wireless: true,
            disable_adapter_on_stop: true,
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    DEFAULT_LISTEN_ADDR
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 5150)))
}

/// Returns the default config file location, if a config dir exists.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("thermo").join(CONFIG_FILE_NAME))
}

impl DaemonConfig {
    /// Loads the config from file and environment and validates it.
    ///
    /// # Errors
    ///
    /// - `ConfigError::Read` / `ConfigError::Parse` for an unreadable file
    ///   (a missing default file is not an error; a missing explicit one is)
    /// - `ConfigError::Env` for an unparsable environment override
    /// - `ConfigError::Invalid` / `ConfigError::Service` from validation
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML config file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Self::from_toml(&contents).map_err(|e| match e {
            ConfigError::Parse { reason, .. } => ConfigError::Parse {
                path: Some(path.to_path_buf()),
                reason,
            },
            other => other,
        })
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: None,
            reason: e.to_string(),
        })
    }

    /// Applies environment-style overrides. `lookup` returns the value of a
    /// variable, if set.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_LISTEN) {
            self.listen_addr = value.parse().map_err(|_| ConfigError::Env {
                key: ENV_LISTEN,
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup(ENV_SENSOR) {
            self.sensor_path = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_POLL_MS) {
            self.poll_interval_ms = value.parse().map_err(|_| ConfigError::Env {
                key: ENV_POLL_MS,
                value: value.clone(),
            })?;
        }
        Ok(())
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Zero delays would turn the retry and probe loops into busy spins
        let nonzero = [
            ("poll_interval_ms", self.poll_interval_ms),
            ("accept_backoff_ms", self.accept_backoff_ms),
            ("liveness_interval_ms", self.liveness_interval_ms),
        ];
        if let Some((field, _)) = nonzero.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid {
                field: *field,
                reason: "must be greater than zero".to_string(),
            });
        }
        self.service.validate()?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn listener_timing(&self) -> ListenerTiming {
        ListenerTiming {
            accept_backoff: Duration::from_millis(self.accept_backoff_ms),
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            liveness_interval: Duration::from_millis(self.liveness_interval_ms),
        }
    }

    /// Engine settings for the session manager.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            poll_interval: self.poll_interval(),
            service: self.service.clone(),
            listener: self.listener_timing(),
            disable_adapter_on_stop: self.disable_adapter_on_stop,
        }
    }
}

/// Errors loading the daemon configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config{}: {reason}", describe_path(.path))]
    Parse {
        path: Option<PathBuf>,
        reason: String,
    },

    #[error("Invalid value for {key}: {value:?}")]
    Env { key: &'static str, value: String },

    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Invalid service: {0}")]
    Service(#[from] ServiceError),
}

fn describe_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" {}", p.display()))
        .unwrap_or_default()
}
