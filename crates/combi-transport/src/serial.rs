//! Serial line transport.
//!
//! Wraps a `tokio-serial` stream. Line parameters are validated when the
//! settings are built, so [`SerialTransport::open`](crate::Transport::open)
//! only fails on OS-level errors.

use std::time::Duration;

use bytes::{Buf, BytesMut};
use combi_core::{LoggingType, constants::*};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::Transport;
use crate::wire_log::WireLogger;

/// Serial parity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

impl Parity {
    /// Parse the numeric or named parity property value.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "0" | "none" => Some(Parity::None),
            "1" | "odd" => Some(Parity::Odd),
            "2" | "even" => Some(Parity::Even),
            _ => None,
        }
    }
}

/// Serial line parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    pub baudrate: u32,
    pub databits: u8,
    pub stopbits: u8,
    pub parity: Parity,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baudrate: DEFAULT_BAUDRATE,
            databits: DEFAULT_DATABITS,
            stopbits: DEFAULT_STOPBITS,
            parity: Parity::None,
        }
    }
}

impl SerialSettings {
    /// Check that every parameter is supported by the serial driver.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Configuration`] naming the bad parameter.
    pub fn validate(&self) -> Result<()> {
        self.data_bits()?;
        self.stop_bits()?;
        if self.baudrate == 0 {
            return Err(TransportError::configuration("Baudrate must be positive"));
        }
        Ok(())
    }

    fn data_bits(&self) -> Result<tokio_serial::DataBits> {
        match self.databits {
            5 => Ok(tokio_serial::DataBits::Five),
            6 => Ok(tokio_serial::DataBits::Six),
            7 => Ok(tokio_serial::DataBits::Seven),
            8 => Ok(tokio_serial::DataBits::Eight),
            other => Err(TransportError::configuration(format!(
                "Unsupported data bits: {}",
                other
            ))),
        }
    }

    fn stop_bits(&self) -> Result<tokio_serial::StopBits> {
        match self.stopbits {
            1 => Ok(tokio_serial::StopBits::One),
            2 => Ok(tokio_serial::StopBits::Two),
            other => Err(TransportError::configuration(format!(
                "Unsupported stop bits: {}",
                other
            ))),
        }
    }

    fn parity(&self) -> tokio_serial::Parity {
        match self.parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::Even => tokio_serial::Parity::Even,
        }
    }
}

/// Serial port transport.
pub struct SerialTransport {
    port_name: String,
    settings: SerialSettings,
    port: Option<SerialStream>,
    buffer: BytesMut,
    timeout: Duration,
    log: WireLogger,
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("port_name", &self.port_name)
            .field("settings", &self.settings)
            .field("open", &self.port.is_some())
            .finish()
    }
}

impl SerialTransport {
    /// Create a transport for the named port.
    ///
    /// # Errors
    ///
    /// Fails if the line settings are not supported.
    pub fn new(
        port_name: impl Into<String>,
        settings: SerialSettings,
        logging: LoggingType,
    ) -> Result<Self> {
        settings.validate()?;
        let port_name = port_name.into();
        Ok(Self {
            log: WireLogger::new(logging, port_name.clone()),
            port_name,
            settings,
            port: None,
            buffer: BytesMut::with_capacity(256),
            timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        })
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }

    fn take(&mut self, max: usize) -> Vec<u8> {
        let n = max.min(self.buffer.len());
        let data = self.buffer.copy_to_bytes(n).to_vec();
        self.log.inbound(&data);
        data
    }
}

impl Transport for SerialTransport {
    async fn open(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Ok(());
        }
        debug!(port = %self.port_name, baudrate = self.settings.baudrate, "Opening serial port");
        let port = tokio_serial::new(&self.port_name, self.settings.baudrate)
            .data_bits(self.settings.data_bits()?)
            .stop_bits(self.settings.stop_bits()?)
            .parity(self.settings.parity())
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| TransportError::open_failed(&self.port_name, e.to_string()))?;
        self.buffer.clear();
        self.port = Some(port);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            debug!(port = %self.port_name, "Closing serial port");
            self.buffer.clear();
        }
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    async fn read(&mut self, max: usize) -> Result<Vec<u8>> {
        if max == 0 {
            return Ok(Vec::new());
        }
        if self.buffer.is_empty() {
            let port = self
                .port
                .as_mut()
                .ok_or_else(|| TransportError::not_open(&self.port_name))?;
            match tokio::time::timeout(self.timeout, port.read_buf(&mut self.buffer)).await {
                Err(_) => return Ok(Vec::new()),
                Ok(Ok(0)) => return Err(TransportError::closed(&self.port_name)),
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(e.into()),
            }
        }
        Ok(self.take(max))
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| TransportError::not_open(&self.port_name))?;
        port.write_all(data).await?;
        self.log.outbound(data);
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        match self.port.as_mut() {
            Some(port) => Ok(port.flush().await?),
            None => Err(TransportError::not_open(&self.port_name)),
        }
    }

    fn available(&mut self) -> Result<usize> {
        let port = self
            .port
            .as_ref()
            .ok_or_else(|| TransportError::not_open(&self.port_name))?;
        let pending = port.bytes_to_read()? as usize;
        Ok(self.buffer.len() + pending)
    }

    fn target(&self) -> &str {
        &self.port_name
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }
}
