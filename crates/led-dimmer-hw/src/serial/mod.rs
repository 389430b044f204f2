//! Serial link module.
//!
//! Provides the line transport to the dimmer (USB CDC / CH340 style serial)
//! and the background listener that turns device reports into events.

mod listener;
mod transport;

pub use listener::{LinkEvent, LinkId, ListenerExit, TelemetryListener};
pub use transport::{list_available_ports, ConnectionState, LinkReader, SerialSettings, Transport};
