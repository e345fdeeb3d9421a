//! Advertised service identity.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Friendly name the adapter advertises.
pub const DEFAULT_SERVICE_NAME: &str = "Temperature Monitor IoT";

/// Application-specific service UUID clients look up.
pub const DEFAULT_SERVICE_UUID: Uuid = Uuid::from_u128(0x4e5d48e0_75df_11e3_981f_0800200c9a66);

/// Longest friendly name an adapter accepts, in bytes.
pub const MAX_SERVICE_NAME_LEN: usize = 248;

/// Name and UUID that identify the listening service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceRecord {
    pub name: String,
    pub uuid: Uuid,
}

impl ServiceRecord {
    pub fn new(name: impl Into<String>, uuid: Uuid) -> Self {
        Self {
            name: name.into(),
            uuid,
        }
    }

    /// Checks the record can be advertised.
    ///
    /// # Errors
    ///
    /// - `ServiceError::EmptyName` for a blank name
    /// - `ServiceError::NameTooLong` past `MAX_SERVICE_NAME_LEN` bytes
    /// - `ServiceError::NilUuid` for the all-zero UUID
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.name.trim().is_empty() {
            return Err(ServiceError::EmptyName);
        }
        if self.name.len() > MAX_SERVICE_NAME_LEN {
            return Err(ServiceError::NameTooLong {
                len: self.name.len(),
                max: MAX_SERVICE_NAME_LEN,
            });
        }
        if self.uuid.is_nil() {
            return Err(ServiceError::NilUuid);
        }
        Ok(())
    }
}

impl Default for ServiceRecord {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_NAME, DEFAULT_SERVICE_UUID)
    }
}

impl fmt::Display for ServiceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.uuid)
    }
}

/// Reasons a service record cannot be advertised.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Service name is empty")]
    EmptyName,

    #[error("Service name is {len} bytes (max: {max})")]
    NameTooLong { len: usize, max: usize },

    #[error("Service UUID must not be nil")]
    NilUuid,
}
