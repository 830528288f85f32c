// ESP-IDF implementations of the transport, storage and settings boundaries

pub mod http;
pub mod nvs;
pub mod ota;
pub mod wifi;

pub use http::{EspHttpConnector, EspHttpSession};
pub use nvs::NvsSettings;
pub use ota::{EspImageWriter, Partition};
