//! Line protocol spoken by the dimmer firmware.
//!
//! Every frame is one newline-terminated ASCII line:
//! - Outbound: `SET:<value>` (single) or `SET<n>:<value>` (dual).
//! - Inbound: `BRIGHTNESS:<value>` (single) or `BRIGHTNESS<n>:<value>` (dual).
//!
//! Any other inbound line is ignored.

use crate::channel::{clamp_brightness, parse_saturating, Channel, ChannelMode};

/// Prefix of outbound brightness commands.
const SET_PREFIX: &str = "SET";

/// Prefix of inbound brightness reports.
const TELEMETRY_PREFIX: &str = "BRIGHTNESS";

/// A brightness report received from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Telemetry {
    pub channel: Channel,
    pub brightness: u8,
}

/// Builds the command line (without newline) that sets a channel's brightness.
pub fn encode_set(mode: ChannelMode, channel: Channel, brightness: u8) -> String {
    match mode {
        ChannelMode::Single => format!("{}:{}", SET_PREFIX, brightness),
        ChannelMode::Dual => format!("{}{}:{}", SET_PREFIX, channel, brightness),
    }
}

/// Parses one inbound line.
///
/// Returns `None` for anything that is not a well-formed brightness report in
/// the given mode. Reported values are clamped into 0..=255.
pub fn parse_telemetry(line: &str, mode: ChannelMode) -> Option<Telemetry> {
    let rest = line.trim().strip_prefix(TELEMETRY_PREFIX)?;
    let (suffix, value) = rest.split_once(':')?;

    let channel = match (mode, suffix) {
        (ChannelMode::Single, "") => Channel::ONE,
        (ChannelMode::Dual, digit) if digit.len() == 1 => {
            mode.channel(digit.parse().ok()?)?
        }
        _ => return None,
    };

    let value = parse_saturating(value.trim()).ok()?;
    Some(Telemetry {
        channel,
        brightness: clamp_brightness(value),
    })
}
