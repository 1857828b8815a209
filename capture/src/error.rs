use cwlite_usb::error::{CommandError, ConnectError};

#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    #[error("Unable to open capture board: {0}")]
    Connect(#[from] ConnectError),

    #[error("{0}")]
    Command(#[from] CommandError),

    #[error("Target did not acknowledge: {0:?}")]
    Acknowledgement(String),

    #[error("Unexpected target response: {0:?}")]
    Response(String),

    #[error("Target response is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("Simple-serial version 1.0 is not supported")]
    UnsupportedProtocol,
}

impl CaptureError {
    /// A capture loop may restart the current trace after these.
    pub fn is_retryable(&self) -> bool {
        match self {
            CaptureError::Command(error) => error.is_retryable(),
            _ => false,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("Capture JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum SaveError {
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("Capture JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}
