// Image writer boundary: the OTA partition driver seen from the update core.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlashError {
    /// The driver rejected the finished image as corrupt
    #[error("image validation failed")]
    ValidateFailed,
    #[error("{0}")]
    Driver(String),
}

impl From<anyhow::Error> for FlashError {
    fn from(err: anyhow::Error) -> Self {
        FlashError::Driver(format!("{:#}", err))
    }
}

/// Sequential writer for the inactive firmware slot.
///
/// A handle returned by `begin` is consumed by exactly one of `finalize`
/// or `abort`. Nothing here changes what boots next except
/// `set_boot_target`.
pub trait ImageWriter {
    type Target;
    type Handle;

    fn next_update_target(&mut self) -> Option<Self::Target>;

    /// Human readable name for logs
    fn describe(&self, target: &Self::Target) -> String;

    fn begin(&mut self, target: &Self::Target) -> Result<Self::Handle, FlashError>;

    fn write(&mut self, handle: &mut Self::Handle, data: &[u8]) -> Result<(), FlashError>;

    fn finalize(&mut self, handle: Self::Handle) -> Result<(), FlashError>;

    fn abort(&mut self, handle: Self::Handle);

    fn set_boot_target(&mut self, target: &Self::Target) -> Result<(), FlashError>;
}
