use anyhow::Result;
use esp_idf_hal::prelude::Peripherals;
use esp_idf_svc::{eventloop::EspSystemEventLoop, nvs::EspDefaultNvsPartition};
use log::info;

use onenet_ota::esp::{ota, wifi, EspHttpConnector, EspImageWriter, NvsSettings};
use onenet_ota::{logging, version, DownloadProgress, ErrorKind, OnenetOta, OtaConfig};

// Generate ESP-IDF app descriptor
#[allow(unexpected_cfgs)]
mod app_desc {
    esp_idf_svc::sys::esp_app_desc!();
}

// OneNET status steps (1..=100 is download progress)
const STEP_DOWNLOADED: i32 = 101;
const STEP_DOWNLOAD_FAILED: i32 = 107;
const STEP_UPGRADED: i32 = 201;
const STEP_MD5_FAILED: i32 = 205;
const STEP_UPGRADE_FAILED: i32 = 206;

fn main() -> Result<()> {
    // Initialize ESP-IDF
    esp_idf_svc::sys::link_patches();

    logging::init_logger().expect("Failed to initialize logger");
    info!("{}", version::version_info());
    if let Some(part) = ota::running_partition() {
        info!("Running from partition {}", part.label());
    }

    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let _wifi = wifi::connect(
        peripherals.modem,
        sys_loop,
        nvs.clone(),
        env!("WIFI_SSID"),
        env!("WIFI_PASSWORD"),
    )?;

    let settings = NvsSettings::new(nvs);
    let mut client = OnenetOta::from_settings(
        EspHttpConnector::new(),
        EspImageWriter::new(),
        &settings,
        OtaConfig::default(),
    )?;

    if let Err(e) = client.report_version() {
        log::warn!("Version report failed: {}", e);
    }

    let task = client.check_task()?;
    if !task.available {
        info!("Firmware is up to date");
        return Ok(());
    }
    info!("Upgrading to {}", client.firmware_version());

    let mut last_percent = 0u8;
    let result = client.upgrade(|p: DownloadProgress| {
        if p.percent != last_percent {
            info!("Downloading: {}% ({} B/s)", p.percent, p.recent_bytes);
            last_percent = p.percent;
        }
    });

    match result {
        Ok(()) => {
            report(&mut client, STEP_DOWNLOADED);
            report(&mut client, STEP_UPGRADED);
            info!("Restarting into {}", task.target_version);
            ota::restart();
        }
        Err(e) => {
            let step = match e.kind() {
                ErrorKind::Transport | ErrorKind::SizeMismatch => STEP_DOWNLOAD_FAILED,
                ErrorKind::Integrity => STEP_MD5_FAILED,
                _ => STEP_UPGRADE_FAILED,
            };
            report(&mut client, step);
            Err(e.into())
        }
    }
}

fn report<N, W>(client: &mut OnenetOta<N, W>, step: i32)
where
    N: onenet_ota::transport::HttpConnector,
    W: onenet_ota::storage::ImageWriter,
{
    if let Err(e) = client.report_status(step) {
        log::warn!("Status report {} failed: {}", step, e);
    }
}
