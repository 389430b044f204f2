//! Parsing of raw text entered in the UI.

use crate::error::ValidationError;
use led_dimmer_hw::{clamp_brightness, parse_saturating, MAX_BRIGHTNESS};

const MS_PER_SECOND: u64 = 1000;

/// Parses a manual brightness entry, saturating it into 0..=255.
pub fn parse_manual_brightness(raw: &str) -> Result<u8, ValidationError> {
    parse_integer(raw).map(clamp_brightness)
}

/// Parses a timer brightness entry, which must already be within 0..=255.
pub fn parse_timer_brightness(raw: &str) -> Result<u8, ValidationError> {
    let value = parse_integer(raw)?;
    if !(0..=MAX_BRIGHTNESS as i64).contains(&value) {
        return Err(ValidationError::BrightnessOutOfRange(value));
    }
    Ok(value as u8)
}

/// Parses a duration in (possibly fractional) minutes into milliseconds.
///
/// Countdowns run in whole ticks, so the result is rounded to the nearest second.
pub fn parse_duration_ms(raw: &str) -> Result<u64, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingValue("timer duration"));
    }
    let minutes: f64 = trimmed
        .parse()
        .map_err(|_| ValidationError::InvalidDuration(raw.to_string()))?;
    if !minutes.is_finite() || minutes < 0.0 {
        return Err(ValidationError::InvalidDuration(raw.to_string()));
    }

    let seconds = (minutes * 60.0).round() as u64;
    Ok(seconds.saturating_mul(MS_PER_SECOND))
}

fn parse_integer(raw: &str) -> Result<i64, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingValue("brightness"));
    }
    parse_saturating(trimmed).map_err(|_| ValidationError::NotAnInteger(raw.to_string()))
}

/// Formats a remaining time as `MM:SS`.
pub fn format_remaining(remaining_ms: u64) -> String {
    let minutes = remaining_ms / 60_000;
    let seconds = (remaining_ms / MS_PER_SECOND) % 60;
    format!("{:02}:{:02}", minutes, seconds)
}
