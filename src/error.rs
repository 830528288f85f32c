use thiserror::Error;

/// Everything that can go wrong while talking to the update service or
/// flashing an image. "No task" from `check_task` is not an error.
#[derive(Debug, Error)]
pub enum OtaError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("no pending OTA task")]
    NoTask,

    #[error("content length mismatch: declared {declared}, expected {expected}")]
    SizeMismatch { declared: u64, expected: u64 },

    #[error("no update partition available")]
    StorageUnavailable,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("image validation failed, image is corrupted")]
    ValidateFailed,

    #[error("MD5 verification failed: expected {expected}, calculated {actual}")]
    Integrity { expected: String, actual: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Protocol,
    NoTask,
    SizeMismatch,
    StorageUnavailable,
    Storage,
    ValidateFailed,
    Integrity,
}

impl OtaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OtaError::Transport(_) => ErrorKind::Transport,
            OtaError::Protocol(_) => ErrorKind::Protocol,
            OtaError::NoTask => ErrorKind::NoTask,
            OtaError::SizeMismatch { .. } => ErrorKind::SizeMismatch,
            OtaError::StorageUnavailable => ErrorKind::StorageUnavailable,
            OtaError::Storage(_) => ErrorKind::Storage,
            OtaError::ValidateFailed => ErrorKind::ValidateFailed,
            OtaError::Integrity { .. } => ErrorKind::Integrity,
        }
    }

    /// Wrap a collaborator failure, keeping the whole context chain.
    pub(crate) fn transport(context: &str, err: anyhow::Error) -> Self {
        OtaError::Transport(format!("{}: {:#}", context, err))
    }
}

pub type Result<T, E = OtaError> = core::result::Result<T, E>;
