//! OneNET OTA client for ESP32-class devices.
//!
//! Reports the running firmware version, polls the OneNET fuse-ota service
//! for a pending task, streams the new image into the inactive OTA slot
//! while hashing it, and switches the boot partition only after the MD5
//! matches. The update logic is target independent; ESP-IDF bindings for
//! the HTTP client, OTA partitions and NVS live in [`esp`] behind the `esp`
//! feature.

pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod hash;
pub mod image;
pub mod logging;
pub mod pipeline;
pub mod storage;
pub mod task;
pub mod transport;
pub mod version;

#[cfg(feature = "esp")]
pub mod esp;

#[cfg(test)]
mod tests;

pub use client::OnenetOta;
pub use config::{Credentials, OtaConfig, SettingsStore};
pub use error::{ErrorKind, OtaError};
pub use pipeline::{DownloadProgress, UpgradeState};
pub use task::UpdateTask;
