//! Configuration management.

use anyhow::{Context, Result};
use led_dimmer_hw::{ChannelMode, SerialSettings, DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT_MS};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Serial port configuration
    #[serde(default)]
    pub serial: SerialConfig,

    /// Device configuration
    #[serde(default)]
    pub device: DeviceConfig,

    /// UI event stream configuration
    #[serde(default)]
    pub events: EventsConfig,
}

/// Serial port configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Port to connect to at start-up (none = wait for `connect`)
    #[serde(default)]
    pub port: Option<String>,

    /// Baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Read timeout in milliseconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout(),
        }
    }
}

/// Device configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Firmware protocol: "single" or "dual"
    #[serde(default = "default_channels")]
    pub channels: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            channels: default_channels(),
        }
    }
}

/// UI event stream configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Broadcast buffer size
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

// Default value functions
fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_read_timeout() -> u64 {
    DEFAULT_READ_TIMEOUT_MS
}

fn default_channels() -> String {
    "dual".to_string()
}

fn default_capacity() -> usize {
    64
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read configuration file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse configuration")?;
        Ok(config)
    }

    /// Returns the configured channel mode.
    pub fn channel_mode(&self) -> Result<ChannelMode> {
        self.device
            .channels
            .parse()
            .context("Invalid device.channels setting")
    }

    /// Returns the serial settings for the transport.
    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings {
            baud_rate: self.serial.baud_rate,
            read_timeout: Duration::from_millis(self.serial.read_timeout_ms),
        }
    }
}
