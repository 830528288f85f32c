// Centralized version information

// Cargo package version from Cargo.toml
pub const CARGO_VERSION: &str = env!("CARGO_PKG_VERSION");

// Version reported to the update service. Keep in sync with the release
// tags uploaded to the OneNET console.
pub const FIRMWARE_VERSION: &str = CARGO_VERSION;

// Version info string for logging
pub fn version_info() -> String {
    format!("onenet-ota {} ({})", FIRMWARE_VERSION, std::env::consts::ARCH)
}
