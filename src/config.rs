use anyhow::Result;
use serde::{Deserialize, Serialize};
#[cfg(test)]
use std::collections::HashMap;

use crate::version;

pub const SETTINGS_NAMESPACE: &str = "onenet";
pub const KEY_AUTHORIZATION: &str = "ota_auth";
pub const KEY_PRODUCT_ID: &str = "product_id";
pub const KEY_DEVICE_ID: &str = "device_id";

/// Persistent key/value settings (NVS on the device)
pub trait SettingsStore {
    fn get_string(&self, namespace: &str, key: &str) -> Result<Option<String>>;
}

/// Device identity used for every request. Fixed for the lifetime of a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub authorization: String,
    pub product_id: String,
    pub device_id: String,
}

impl Credentials {
    pub fn new(
        authorization: impl Into<String>,
        product_id: impl Into<String>,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            authorization: authorization.into(),
            product_id: product_id.into(),
            device_id: device_id.into(),
        }
    }

    pub fn load<S: SettingsStore + ?Sized>(store: &S) -> Result<Self> {
        let read = |key: &str| -> Result<String> {
            match store.get_string(SETTINGS_NAMESPACE, key)? {
                Some(value) => Ok(value),
                None => {
                    log::warn!("OTA setting '{}/{}' is not provisioned", SETTINGS_NAMESPACE, key);
                    Ok(String::new())
                }
            }
        };

        let credentials = Self {
            authorization: read(KEY_AUTHORIZATION)?,
            product_id: read(KEY_PRODUCT_ID)?,
            device_id: read(KEY_DEVICE_ID)?,
        };
        log::info!(
            "Loaded OTA identity: product={}, device={}, auth={}",
            credentials.product_id,
            credentials.device_id,
            if credentials.authorization.is_empty() { "<empty>" } else { "<set>" }
        );
        Ok(credentials)
    }

    pub fn is_complete(&self) -> bool {
        !self.authorization.is_empty() && !self.product_id.is_empty() && !self.device_id.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OtaConfig {
    pub base_url: String,
    /// Reported as `s_version` and used in the task check query
    pub firmware_version: String,
    /// Reported as `f_version`
    pub hardware_version: String,
    pub check_type: u32,
    pub chunk_size: usize,
    pub progress_interval_ms: u64,
}

impl Default for OtaConfig {
    fn default() -> Self {
        Self {
            base_url: "https://iot-api.heclouds.com/fuse-ota".to_string(),
            firmware_version: version::FIRMWARE_VERSION.to_string(),
            hardware_version: "1.0.0".to_string(),
            check_type: 2,
            chunk_size: 512,
            progress_interval_ms: 1000,
        }
    }
}

impl OtaConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let mut config: OtaConfig = serde_json::from_str(json)?;
        if config.chunk_size == 0 {
            log::warn!("chunk_size 0 is invalid, using 512");
            config.chunk_size = 512;
        }
        while config.base_url.ends_with('/') {
            config.base_url.pop();
        }
        Ok(config)
    }
}

/// In-memory settings
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub struct MemorySettings {
    values: HashMap<(String, String), String>,
}

#[cfg(test)]
impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, namespace: &str, key: &str, value: &str) {
        self.values
            .insert((namespace.to_string(), key.to_string()), value.to_string());
    }
}

#[cfg(test)]
impl SettingsStore for MemorySettings {
    fn get_string(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        Ok(self
            .values
            .get(&(namespace.to_string(), key.to_string()))
            .cloned())
    }
}
