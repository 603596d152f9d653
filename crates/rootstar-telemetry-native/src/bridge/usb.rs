//! Serial transport for telemetry devices
//!
//! Wraps a `serialport` handle as a [`ByteSource`]. Read timeouts of the
//! driver surface as "no byte" rather than as errors.

use std::io::{self, Read};
use std::time::Duration;

use crate::acquisition::TransportFactory;
use crate::bridge::ByteSource;
use crate::config::SerialConfig;
use crate::error::{AcquisitionResult, ConfigError};

/// Serial connection to a telemetry device
pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
    name: String,
}

impl SerialTransport {
    /// Open a serial connection to the device
    ///
    /// # Arguments
    ///
    /// * `port_name` - Serial port name (e.g., "/dev/ttyUSB0" or "COM3")
    /// * `baud_rate` - Baud rate (typically 57600 or 115200)
    /// * `read_timeout` - How long a single-byte read may block
    ///
    /// # Errors
    ///
    /// Returns error if port cannot be opened
    pub fn open(
        port_name: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> AcquisitionResult<Self> {
        let port = serialport::new(port_name, baud_rate).timeout(read_timeout).open()?;
        tracing::info!("Opened {port_name} at {baud_rate} baud");

        Ok(Self { port, name: port_name.to_string() })
    }

    /// Open the port named in a [`SerialConfig`]
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no port is named, or the error of
    /// [`Self::open`].
    pub fn from_config(config: &SerialConfig) -> AcquisitionResult<Self> {
        let port = config.port.as_deref().ok_or_else(|| ConfigError::Invalid {
            field: "serial.port",
            reason: "no serial port configured".to_string(),
        })?;
        Self::open(port, config.baud_rate, Duration::from_millis(config.read_timeout_ms))
    }

    /// Factory that reopens the configured port after a link failure
    #[must_use]
    pub fn reopener(config: SerialConfig) -> TransportFactory {
        Box::new(move || {
            Self::from_config(&config)
                .map(|transport| Box::new(transport) as Box<dyn ByteSource>)
                .map_err(|err| io::Error::new(io::ErrorKind::NotConnected, err))
        })
    }

    /// List available serial ports
    #[must_use]
    pub fn list_ports() -> Vec<String> {
        serialport::available_ports()
            .map(|ports| ports.into_iter().map(|p| p.port_name).collect())
            .unwrap_or_default()
    }

    /// Port name this transport was opened on
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl ByteSource for SerialTransport {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.port.read(&mut byte) {
            Ok(1) => Ok(Some(byte[0])),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        let count = self.port.bytes_to_read().map_err(io::Error::from)?;
        Ok(count as usize)
    }
}
