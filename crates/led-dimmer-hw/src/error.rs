//! Error types for the LED dimmer hardware library.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to the dimmer.
#[derive(Error, Debug)]
pub enum Error {
    /// Serial port does not exist.
    #[error("Serial port not found: {0}")]
    PortNotFound(String),

    /// Serial port is held by another process.
    #[error("Serial port busy: {0}")]
    PortBusy(String),

    /// No permission to open the serial port.
    #[error("Permission denied opening serial port: {0}")]
    PermissionDenied(String),

    /// Serial port error not covered above.
    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// Serial I/O error.
    #[error("Serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Write attempted while no port is open.
    #[error("Serial port is not connected")]
    NotConnected,

    /// Unknown channel mode name.
    #[error("Invalid channel mode: {0}")]
    InvalidChannelMode(String),
}

