use thiserror::Error;

#[derive(Debug, Error)]
pub enum FdiskError {
    #[error("Device too small: {0}")]
    Capacity(String),

    #[error("Entered text does not match: {0:?}")]
    ConfirmationMismatch(String),

    #[error("Device I/O failed at sector {lba}: {reason}")]
    DeviceIo { lba: u32, reason: String },

    #[error("Could not allocate {0} on the new volume")]
    AllocationFailure(String),

    #[error("Filename or extension too long, must fit in 8.3: {0}")]
    NameTooLong(String),

    #[error("No card detected on bus {0}")]
    NoDevice(u8),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Operation cancelled by user")]
    Aborted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FdiskError {
    pub fn device_io(lba: u32, reason: impl std::fmt::Display) -> Self {
        FdiskError::DeviceIo {
            lba,
            reason: reason.to_string(),
        }
    }
}
