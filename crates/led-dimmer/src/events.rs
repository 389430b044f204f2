//! Events published to the UI.

use crate::input::format_remaining;
use led_dimmer_hw::Channel;

/// What caused a brightness change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrightnessSource {
    /// Slider, text entry or preset button.
    Manual,
    /// Report from the device.
    Telemetry,
    /// Timer start, expiry or reset.
    Timer,
}

impl std::fmt::Display for BrightnessSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BrightnessSource::Manual => write!(f, "manual"),
            BrightnessSource::Telemetry => write!(f, "device"),
            BrightnessSource::Timer => write!(f, "timer"),
        }
    }
}

/// Event stream consumed by the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    /// A channel's brightness changed.
    BrightnessChanged {
        channel: Channel,
        value: u8,
        source: BrightnessSource,
    },
    /// A countdown advanced (or was cleared to zero).
    TimerTick { channel: Channel, remaining_ms: u64 },
    /// A per-channel timer finished; the channel is now at 0.
    TimerExpired(Channel),
    /// Both halves of the combined timer finished.
    CombinedTimerExpired,
    /// A port was opened.
    Connected(String),
    /// The port was closed.
    Disconnected,
    /// A connect, write or read failed.
    ConnectionError(String),
}

impl std::fmt::Display for UiEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UiEvent::BrightnessChanged { channel, value, .. } => {
                write!(f, "LED {} brightness: {}", channel, value)
            }
            UiEvent::TimerTick {
                channel,
                remaining_ms,
            } => write!(
                f,
                "LED {} time remaining: {}",
                channel,
                format_remaining(*remaining_ms)
            ),
            UiEvent::TimerExpired(channel) => write!(
                f,
                "LED {} timer has finished. Brightness reset to 0.",
                channel
            ),
            UiEvent::CombinedTimerExpired => write!(
                f,
                "Combined timer has finished. Brightness reset to 0 for both LEDs."
            ),
            UiEvent::Connected(port) => write!(f, "Connected to {}", port),
            UiEvent::Disconnected => write!(f, "Disconnected"),
            UiEvent::ConnectionError(message) => write!(f, "Connection error: {}", message),
        }
    }
}
