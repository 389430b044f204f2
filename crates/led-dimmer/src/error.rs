//! Input validation errors.

use thiserror::Error;

/// Rejected user input. Nothing is written to the device when one of these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Input is not an integer.
    #[error("Enter a valid integer for brightness (got {0:?})")]
    NotAnInteger(String),

    /// Timer brightness outside 0-255.
    #[error("Brightness must be between 0 and 255 (got {0})")]
    BrightnessOutOfRange(i64),

    /// Duration is not a finite, non-negative number of minutes.
    #[error("Enter a valid duration in minutes (got {0:?})")]
    InvalidDuration(String),

    /// Channel does not exist in the current mode.
    #[error("Unknown LED channel: {0}")]
    UnknownChannel(u8),

    /// A required field was left empty.
    #[error("Missing {0}")]
    MissingValue(&'static str),
}

/// Error returned through the controller handle.
#[derive(Error, Debug)]
pub enum ControlError {
    /// Input was rejected before anything was sent.
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    /// The device could not be reached.
    #[error(transparent)]
    Device(#[from] led_dimmer_hw::Error),

    /// The controller task is gone.
    #[error("Controller has stopped")]
    Stopped,
}
