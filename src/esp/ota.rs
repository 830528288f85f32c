// OTA partition writer - handles firmware writes using the ESP-IDF OTA API

use core::ffi::{c_void, CStr};
use esp_idf_svc::sys::{
    esp, esp_err_t, esp_ota_abort, esp_ota_begin, esp_ota_end, esp_ota_get_next_update_partition,
    esp_ota_get_running_partition, esp_ota_handle_t, esp_ota_set_boot_partition, esp_ota_write,
    esp_partition_t, esp_restart, EspError, ESP_ERR_OTA_VALIDATE_FAILED, OTA_WITH_SEQUENTIAL_WRITES,
};

use crate::storage::{FlashError, ImageWriter};

/// An OTA app partition from the partition table
pub struct Partition(*const esp_partition_t);

impl Partition {
    pub fn label(&self) -> String {
        // SAFETY: partition table entries are static for the lifetime of the app
        let part = unsafe { &*self.0 };
        unsafe { CStr::from_ptr(part.label.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    pub fn address(&self) -> u32 {
        unsafe { (*self.0).address }
    }

    pub fn size(&self) -> u32 {
        unsafe { (*self.0).size }
    }
}

/// Partition the app is currently running from
pub fn running_partition() -> Option<Partition> {
    let part = unsafe { esp_ota_get_running_partition() };
    (!part.is_null()).then(|| Partition(part))
}

pub struct EspImageWriter;

impl EspImageWriter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EspImageWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageWriter for EspImageWriter {
    type Target = Partition;
    type Handle = esp_ota_handle_t;

    fn next_update_target(&mut self) -> Option<Partition> {
        let part = unsafe { esp_ota_get_next_update_partition(core::ptr::null()) };
        if part.is_null() {
            log::error!("Failed to get update partition");
            return None;
        }
        Some(Partition(part))
    }

    fn describe(&self, target: &Partition) -> String {
        format!(
            "{} at offset 0x{:x} ({} KB)",
            target.label(),
            target.address(),
            target.size() / 1024
        )
    }

    fn begin(&mut self, target: &Partition) -> Result<esp_ota_handle_t, FlashError> {
        let mut handle: esp_ota_handle_t = 0;
        // Erase sector by sector as data arrives instead of the whole slot up front
        esp!(unsafe {
            esp_ota_begin(target.0, OTA_WITH_SEQUENTIAL_WRITES as _, &mut handle as *mut _)
        })
        .map_err(driver)?;
        Ok(handle)
    }

    fn write(&mut self, handle: &mut esp_ota_handle_t, data: &[u8]) -> Result<(), FlashError> {
        esp!(unsafe { esp_ota_write(*handle, data.as_ptr() as *const c_void, data.len() as _) })
            .map_err(driver)
    }

    fn finalize(&mut self, handle: esp_ota_handle_t) -> Result<(), FlashError> {
        let result = unsafe { esp_ota_end(handle) };
        if result == ESP_ERR_OTA_VALIDATE_FAILED as esp_err_t {
            log::error!("Image validation failed, image is corrupted");
            return Err(FlashError::ValidateFailed);
        }
        esp!(result).map_err(driver)
    }

    fn abort(&mut self, handle: esp_ota_handle_t) {
        if let Err(e) = esp!(unsafe { esp_ota_abort(handle) }) {
            log::warn!("esp_ota_abort failed: {}", e);
        }
    }

    fn set_boot_target(&mut self, target: &Partition) -> Result<(), FlashError> {
        esp!(unsafe { esp_ota_set_boot_partition(target.0) }).map_err(driver)
    }
}

fn driver(err: EspError) -> FlashError {
    FlashError::Driver(err.to_string())
}

/// Reboot into whatever partition is marked for boot
pub fn restart() -> ! {
    // Give the log a moment to drain over serial
    std::thread::sleep(std::time::Duration::from_millis(1000));
    unsafe { esp_restart() }
}
