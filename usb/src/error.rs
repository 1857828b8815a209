use crate::memory::Address;
use cwlite_types::FirmwareVersion;

#[derive(thiserror::Error, Debug)]
pub enum ConnectError {
    #[error("No ChipWhisperer-Lite device was found")]
    DeviceNotFound,

    #[error("USB error: {0}")]
    UsbError(#[from] rusb::Error),

    #[error("Unable to Claim Interface")]
    DeviceNotClaimed,

    #[error("Unsupported firmware version {0}, expected {1}")]
    UnsupportedFirmware(FirmwareVersion, FirmwareVersion),

    #[error("Device did not respond: {0}")]
    Command(#[from] CommandError),
}

#[derive(thiserror::Error, Debug)]
pub enum CommandError {
    #[error("USB error: {0}")]
    UsbError(#[from] rusb::Error),

    #[error("Short control transfer, expected {expected} bytes, got {actual}")]
    ShortControlTransfer { expected: usize, actual: usize },

    #[error("Short bulk transfer, expected {expected} bytes, got {actual}")]
    ShortBulkTransfer { expected: usize, actual: usize },

    #[error("Write verification failed at {address:#x}")]
    VerificationFailed { address: Address },

    #[error("Mask length ({mask}) doesn't match data length ({data})")]
    MaskLength { mask: usize, data: usize },

    #[error("FPGA done pin failed to go high, bad bitstream?")]
    ProgrammingFailed,

    #[error("Unable to read bitstream: {0}")]
    Bitstream(std::io::Error),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Unexpected register value: {0}")]
    UnexpectedRegister(String),

    #[error("Timed out waiting for data")]
    Timeout,

    #[error("Unexpected trace sync byte {0:02x?}")]
    Framing(Option<u8>),

    #[error("Malformed response from device")]
    MalformedResponse(#[from] std::io::Error),
}

impl CommandError {
    /// Timeouts are the only failures a capture loop may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CommandError::Timeout)
    }
}
