use anyhow::{bail, Result};
use esp_idf_hal::modem::Modem;
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    nvs::EspDefaultNvsPartition,
    wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi},
};

/// Bring up station mode and block until DHCP completes
pub fn connect(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs: EspDefaultNvsPartition,
    ssid: &str,
    password: &str,
) -> Result<BlockingWifi<EspWifi<'static>>> {
    if ssid.is_empty() {
        log::error!("WiFi SSID is empty! Check wifi_config.h");
        bail!("WiFi SSID cannot be empty");
    }

    let mut wifi = BlockingWifi::wrap(EspWifi::new(modem, sys_loop.clone(), Some(nvs))?, sys_loop)?;

    let cfg = Configuration::Client(ClientConfiguration {
        ssid: ssid
            .try_into()
            .map_err(|_| anyhow::anyhow!("Invalid SSID format: {}", ssid))?,
        password: password
            .try_into()
            .map_err(|_| anyhow::anyhow!("Invalid password format"))?,
        auth_method: if password.is_empty() {
            log::warn!("WiFi password is empty, using open network");
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        },
        ..Default::default()
    });
    wifi.set_configuration(&cfg)?;

    log::info!("Connecting to {}...", ssid);
    wifi.start()?;
    wifi.connect()?;

    log::info!("Waiting for DHCP...");
    wifi.wait_netif_up()?;

    let ip = wifi.wifi().sta_netif().get_ip_info()?;
    log::info!("WiFi connected, IP {}", ip.ip);
    Ok(wifi)
}
