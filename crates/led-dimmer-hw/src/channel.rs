//! Channel identity and brightness range.

use crate::{Error, Result, MAX_BRIGHTNESS};
use std::num::{IntErrorKind, ParseIntError};
use std::str::FromStr;

/// One independently controllable LED output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Channel(u8);

impl Channel {
    /// First LED output; the only one in single-channel mode.
    pub const ONE: Channel = Channel(1);
    /// Second LED output.
    pub const TWO: Channel = Channel(2);

    /// Returns the channel for an id in {1, 2}.
    pub fn new(id: u8) -> Option<Self> {
        match id {
            1 => Some(Channel::ONE),
            2 => Some(Channel::TWO),
            _ => None,
        }
    }

    /// Returns the numeric channel id.
    pub fn id(self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which firmware protocol the device speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelMode {
    /// One LED, frames carry no channel digit.
    Single,
    /// Two LEDs, frames carry a channel digit.
    #[default]
    Dual,
}

impl ChannelMode {
    /// Channels available in this mode.
    pub fn channels(&self) -> &'static [Channel] {
        match self {
            ChannelMode::Single => &[Channel::ONE],
            ChannelMode::Dual => &[Channel::ONE, Channel::TWO],
        }
    }

    /// Resolves a raw channel id against this mode.
    pub fn channel(&self, id: u8) -> Option<Channel> {
        Channel::new(id).filter(|channel| self.channels().contains(channel))
    }
}

impl FromStr for ChannelMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "single" | "1" => Ok(ChannelMode::Single),
            "dual" | "double" | "2" => Ok(ChannelMode::Dual),
            _ => Err(Error::InvalidChannelMode(s.to_string())),
        }
    }
}

impl std::fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelMode::Single => write!(f, "single"),
            ChannelMode::Dual => write!(f, "dual"),
        }
    }
}

/// Saturates a brightness value into 0..=255.
pub fn clamp_brightness(value: i64) -> u8 {
    value.clamp(0, MAX_BRIGHTNESS as i64) as u8
}

/// Parses a decimal integer, saturating values that overflow `i64`.
pub fn parse_saturating(text: &str) -> std::result::Result<i64, ParseIntError> {
    match text.parse::<i64>() {
        Err(e) if *e.kind() == IntErrorKind::PosOverflow => Ok(i64::MAX),
        Err(e) if *e.kind() == IntErrorKind::NegOverflow => Ok(i64::MIN),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_brightness() {
        assert_eq!(clamp_brightness(-40), 0);
        assert_eq!(clamp_brightness(0), 0);
        assert_eq!(clamp_brightness(128), 128);
        assert_eq!(clamp_brightness(255), 255);
        assert_eq!(clamp_brightness(999), 255);
        assert_eq!(clamp_brightness(i64::MIN), 0);
        assert_eq!(clamp_brightness(i64::MAX), 255);
    }

    #[test]
    fn test_clamp_is_idempotent() {
        for value in [-1000, -1, 0, 1, 127, 254, 255, 256, 100_000] {
            let once = clamp_brightness(value);
            assert_eq!(clamp_brightness(once as i64), once);
        }
    }

    #[test]
    fn test_parse_saturating() {
        assert_eq!(parse_saturating("42"), Ok(42));
        assert_eq!(parse_saturating("-7"), Ok(-7));
        assert_eq!(parse_saturating("99999999999999999999"), Ok(i64::MAX));
        assert_eq!(parse_saturating("-99999999999999999999"), Ok(i64::MIN));
        assert!(parse_saturating("12.5").is_err());
        assert!(parse_saturating("").is_err());
        assert!(parse_saturating("-").is_err());
    }

    #[test]
    fn test_channel_new() {
        assert_eq!(Channel::new(1), Some(Channel::ONE));
        assert_eq!(Channel::new(2), Some(Channel::TWO));
        assert_eq!(Channel::new(0), None);
        assert_eq!(Channel::new(3), None);
    }

    #[test]
    fn test_mode_channels() {
        assert_eq!(ChannelMode::Single.channel(1), Some(Channel::ONE));
        assert_eq!(ChannelMode::Single.channel(2), None);
        assert_eq!(ChannelMode::Dual.channel(2), Some(Channel::TWO));
        assert_eq!(ChannelMode::Dual.channels().len(), 2);
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("single".parse::<ChannelMode>().unwrap(), ChannelMode::Single);
        assert_eq!("Dual".parse::<ChannelMode>().unwrap(), ChannelMode::Dual);
        assert!("triple".parse::<ChannelMode>().is_err());
    }
}
