//! Line transport over a serial port.

use crate::{Error, Result, DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT_MS};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, StopBits};
use tracing::{debug, info};

/// Read half of an open link, handed to the telemetry listener.
pub type LinkReader = Box<dyn AsyncRead + Send + Unpin>;

type LinkWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Serial port parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialSettings {
    /// Baud rate.
    pub baud_rate: u32,
    /// Read timeout.
    pub read_timeout: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
        }
    }
}

/// Observable connection state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionState {
    /// Port of the current connection.
    pub port: Option<String>,
    /// Whether the link is open.
    pub open: bool,
}

/// Owns the write side of the serial connection.
pub struct Transport {
    settings: SerialSettings,
    port: Option<String>,
    writer: Option<LinkWriter>,
}

impl Transport {
    /// Creates a closed transport.
    pub fn new(settings: SerialSettings) -> Self {
        Self {
            settings,
            port: None,
            writer: None,
        }
    }

    /// Opens a serial port, closing any previous connection first.
    ///
    /// Returns the read half of the link for the telemetry listener.
    pub fn connect(&mut self, port_id: &str) -> Result<LinkReader> {
        self.disconnect();

        let stream = tokio_serial::new(port_id, self.settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(self.settings.read_timeout)
            .open_native_async()
            .map_err(|e| classify_open_error(port_id, e))?;

        info!(
            "Opened serial port {} at {} baud",
            port_id, self.settings.baud_rate
        );
        Ok(self.attach(port_id, stream))
    }

    /// Adopts an already open byte stream as the link.
    pub fn attach<S>(&mut self, port_id: &str, stream: S) -> LinkReader
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        self.disconnect();

        let (reader, writer) = tokio::io::split(stream);
        self.port = Some(port_id.to_string());
        self.writer = Some(Box::new(writer));
        Box::new(reader)
    }

    /// Writes `text` followed by a newline.
    pub async fn send_line(&mut self, text: &str) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(Error::NotConnected)?;

        debug!("Sending frame: {}", text);
        writer.write_all(text.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }

    /// Closes the link. Safe to call when already closed.
    pub fn disconnect(&mut self) {
        self.writer = None;
        if let Some(port) = self.port.take() {
            info!("Closed serial port {}", port);
        }
    }

    /// Returns true if a link is open.
    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    /// Returns the port of the current connection.
    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    /// Returns the current connection state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState {
            port: self.port.clone(),
            open: self.is_open(),
        }
    }
}

/// Maps a port open failure onto a connect error.
fn classify_open_error(port_id: &str, e: tokio_serial::Error) -> Error {
    if cfg!(unix) && !std::path::Path::new(port_id).exists() {
        return Error::PortNotFound(port_id.to_string());
    }
    if e.description.to_lowercase().contains("busy") {
        return Error::PortBusy(port_id.to_string());
    }
    match e.kind {
        tokio_serial::ErrorKind::NoDevice
        | tokio_serial::ErrorKind::Io(std::io::ErrorKind::NotFound) => {
            Error::PortNotFound(port_id.to_string())
        }
        tokio_serial::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
            Error::PermissionDenied(port_id.to_string())
        }
        _ => Error::Serial(e),
    }
}

/// Lists serial ports present on the system.
pub fn list_available_ports() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports()?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_send_line_appends_newline() {
        let (local, mut remote) = tokio::io::duplex(64);
        let mut transport = Transport::new(SerialSettings::default());
        let _reader = transport.attach("loopback", local);

        transport.send_line("SET1:128").await.unwrap();

        let mut buf = [0u8; 9];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"SET1:128\n");
    }

    #[tokio::test]
    async fn test_send_line_when_closed() {
        let mut transport = Transport::new(SerialSettings::default());
        let err = transport.send_line("SET:1").await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let (local, _remote) = tokio::io::duplex(64);
        let mut transport = Transport::new(SerialSettings::default());
        let _reader = transport.attach("loopback", local);
        assert_eq!(
            transport.state(),
            ConnectionState {
                port: Some("loopback".to_string()),
                open: true
            }
        );

        transport.disconnect();
        transport.disconnect();
        assert!(!transport.is_open());
        assert_eq!(transport.port(), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_connect_missing_port() {
        let mut transport = Transport::new(SerialSettings::default());
        let result = transport.connect("/dev/led-dimmer-does-not-exist");
        assert!(matches!(result, Err(Error::PortNotFound(_))));
        assert!(!transport.is_open());
    }

    // Hardware tests are skipped by default
    #[tokio::test]
    #[ignore]
    async fn test_connect_device() {
        let mut transport = Transport::new(SerialSettings::default());
        assert!(transport.connect("/dev/ttyACM0").is_ok());
        assert!(transport.send_line("SET1:0").await.is_ok());
    }
}
