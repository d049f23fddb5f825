//! Per-installation device identifier.
//!
//! The identifier is created once, saved in the preference store and reused
//! on every later launch. It is session metadata only, never a credential.

use std::fmt;

use uuid::Uuid;

use crate::preferences::PreferenceStore;

/// Preference key holding the saved identifier
pub const DEVICE_ID_KEY: &str = "spark_vault_device_id";

/// A resolved device identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceId {
    value: String,
    persisted: bool,
}

impl DeviceId {
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// False when storage was unavailable and the id only lives for this run.
    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    pub fn into_string(self) -> String {
        self.value
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Generate a new random device ID
pub fn generate_device_id() -> String {
    Uuid::new_v4().to_string()
}

/// Resolves the device identifier from local storage.
pub struct DeviceIdentityProvider<'a> {
    store: &'a dyn PreferenceStore,
    platform_id: Option<String>,
}

impl<'a> DeviceIdentityProvider<'a> {
    pub fn new(store: &'a dyn PreferenceStore) -> Self {
        Self {
            store,
            platform_id: None,
        }
    }

    /// Use the identifier supplied by a native runtime instead of a random one
    /// when no saved id exists.
    pub fn with_platform_id(mut self, platform_id: Option<String>) -> Self {
        self.platform_id = platform_id.filter(|id| !id.trim().is_empty());
        self
    }

    /// Return the saved identifier, or create, save and return a new one.
    ///
    /// Never fails: if storage cannot be read or written, a fresh identifier is
    /// returned for this run only and may differ on the next launch.
    pub fn get_or_create_device_id(&self) -> DeviceId {
        match self.store.get(DEVICE_ID_KEY) {
            Ok(Some(saved)) if !saved.is_empty() => {
                return DeviceId {
                    value: saved,
                    persisted: true,
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Device ID storage unavailable, using a temporary ID");
                return DeviceId {
                    value: generate_device_id(),
                    persisted: false,
                };
            }
        }

        let value = self.platform_id.clone().unwrap_or_else(generate_device_id);

        match self.store.set(DEVICE_ID_KEY, &value) {
            Ok(()) => {
                tracing::info!(device_id = %value, "Created device ID");
                DeviceId {
                    value,
                    persisted: true,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to save device ID, using it for this run only");
                DeviceId {
                    value,
                    persisted: false,
                }
            }
        }
    }
}
