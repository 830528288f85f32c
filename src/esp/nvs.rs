use anyhow::Result;
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs};

use crate::config::{SettingsStore, KEY_AUTHORIZATION, KEY_DEVICE_ID, KEY_PRODUCT_ID, SETTINGS_NAMESPACE};
use crate::Credentials;

/// Settings backed by the default NVS partition
pub struct NvsSettings {
    partition: EspDefaultNvsPartition,
}

impl NvsSettings {
    pub fn new(partition: EspDefaultNvsPartition) -> Self {
        Self { partition }
    }

    pub fn set_string(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
        let mut nvs = EspNvs::new(self.partition.clone(), namespace, true)?;
        nvs.set_str(key, value)?;
        Ok(())
    }

    /// First-boot provisioning of the OneNET identity
    pub fn provision(&self, credentials: &Credentials) -> Result<()> {
        self.set_string(SETTINGS_NAMESPACE, KEY_AUTHORIZATION, &credentials.authorization)?;
        self.set_string(SETTINGS_NAMESPACE, KEY_PRODUCT_ID, &credentials.product_id)?;
        self.set_string(SETTINGS_NAMESPACE, KEY_DEVICE_ID, &credentials.device_id)?;
        log::info!("OTA identity written to NVS namespace '{}'", SETTINGS_NAMESPACE);
        Ok(())
    }
}

impl SettingsStore for NvsSettings {
    fn get_string(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        let nvs = EspNvs::new(self.partition.clone(), namespace, true)?;

        let Some(len) = nvs.str_len(key)? else {
            return Ok(None);
        };
        let mut buf = vec![0u8; len + 1];
        Ok(nvs.get_str(key, &mut buf)?.map(str::to_string))
    }
}
