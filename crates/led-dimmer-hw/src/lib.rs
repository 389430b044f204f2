//! LED Dimmer Hardware Library
//!
//! Provides the serial link, line protocol and telemetry listener for
//! microcontroller-driven LED dimmers with one or two brightness channels.

pub mod channel;
pub mod error;
pub mod protocol;
pub mod serial;

pub use channel::{clamp_brightness, parse_saturating, Channel, ChannelMode};
pub use error::{Error, Result};
pub use protocol::{encode_set, parse_telemetry, Telemetry};
pub use serial::{
    list_available_ports, ConnectionState, LinkEvent, LinkId, LinkReader, ListenerExit,
    SerialSettings, TelemetryListener, Transport,
};

/// Baud rate the dimmer firmware listens on.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Read timeout applied to the serial port, in milliseconds.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1000;

/// Highest brightness value accepted by the firmware.
pub const MAX_BRIGHTNESS: u8 = 255;
