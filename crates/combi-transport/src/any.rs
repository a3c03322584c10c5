//! Enum dispatch over the concrete transports.
//!
//! The poller is spawned on the tokio runtime and must be `Send`. Native
//! `async fn` in traits cannot express that bound for generic callers, so
//! the driver stores an [`AnyTransport`] and dispatches statically.

use std::net::SocketAddr;
use std::time::Duration;

use combi_core::LoggingType;

use crate::error::Result;
use crate::mock::MockTransport;
use crate::serial::{SerialSettings, SerialTransport};
use crate::tcp::TcpTransport;
use crate::traits::Transport;

/// Any supported transport.
#[derive(Debug)]
pub enum AnyTransport {
    /// TCP connection to a device simulator.
    Tcp(TcpTransport),

    /// Serial line.
    Serial(SerialTransport),

    /// In-process simulated device.
    Mock(MockTransport),
}

impl AnyTransport {
    /// Pick the transport for a connection target.
    ///
    /// Targets that parse as a socket address are TCP endpoints, anything
    /// else names a serial port.
    ///
    /// # Errors
    ///
    /// Fails if the serial settings are invalid.
    pub fn for_target(
        target: &str,
        serial: SerialSettings,
        local_port: Option<u16>,
        logging: LoggingType,
    ) -> Result<Self> {
        match target.parse::<SocketAddr>() {
            Ok(addr) => {
                let mut tcp = TcpTransport::with_logging(addr, logging);
                if let Some(port) = local_port {
                    tcp = tcp.with_local_port(port);
                }
                Ok(Self::Tcp(tcp))
            }
            Err(_) => Ok(Self::Serial(SerialTransport::new(target, serial, logging)?)),
        }
    }
}

impl From<TcpTransport> for AnyTransport {
    fn from(t: TcpTransport) -> Self {
        Self::Tcp(t)
    }
}

impl From<SerialTransport> for AnyTransport {
    fn from(t: SerialTransport) -> Self {
        Self::Serial(t)
    }
}

impl From<MockTransport> for AnyTransport {
    fn from(t: MockTransport) -> Self {
        Self::Mock(t)
    }
}

impl Transport for AnyTransport {
    async fn open(&mut self) -> Result<()> {
        match self {
            Self::Tcp(t) => t.open().await,
            Self::Serial(t) => t.open().await,
            Self::Mock(t) => t.open().await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            Self::Tcp(t) => t.close().await,
            Self::Serial(t) => t.close().await,
            Self::Mock(t) => t.close().await,
        }
    }

    fn set_timeout(&mut self, timeout: Duration) {
        match self {
            Self::Tcp(t) => t.set_timeout(timeout),
            Self::Serial(t) => t.set_timeout(timeout),
            Self::Mock(t) => t.set_timeout(timeout),
        }
    }

    async fn read(&mut self, max: usize) -> Result<Vec<u8>> {
        match self {
            Self::Tcp(t) => t.read(max).await,
            Self::Serial(t) => t.read(max).await,
            Self::Mock(t) => t.read(max).await,
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Tcp(t) => t.write(data).await,
            Self::Serial(t) => t.write(data).await,
            Self::Mock(t) => t.write(data).await,
        }
    }

    async fn flush(&mut self) -> Result<()> {
        match self {
            Self::Tcp(t) => t.flush().await,
            Self::Serial(t) => t.flush().await,
            Self::Mock(t) => t.flush().await,
        }
    }

    fn available(&mut self) -> Result<usize> {
        match self {
            Self::Tcp(t) => t.available(),
            Self::Serial(t) => t.available(),
            Self::Mock(t) => t.available(),
        }
    }

    fn target(&self) -> &str {
        match self {
            Self::Tcp(t) => t.target(),
            Self::Serial(t) => t.target(),
            Self::Mock(t) => t.target(),
        }
    }

    fn is_open(&self) -> bool {
        match self {
            Self::Tcp(t) => t.is_open(),
            Self::Serial(t) => t.is_open(),
            Self::Mock(t) => t.is_open(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_selection() {
        let tcp = AnyTransport::for_target(
            "127.0.0.1:56789",
            SerialSettings::default(),
            None,
            LoggingType::None,
        )
        .unwrap();
        assert!(matches!(tcp, AnyTransport::Tcp(_)));
        assert_eq!(tcp.target(), "127.0.0.1:56789");

        let serial = AnyTransport::for_target(
            "/dev/ttyUSB0",
            SerialSettings::default(),
            None,
            LoggingType::None,
        )
        .unwrap();
        assert!(matches!(serial, AnyTransport::Serial(_)));
        assert!(!serial.is_open());
    }

    #[test]
    fn test_mock_conversion() {
        let (mock, _handle) = MockTransport::new();
        let transport = AnyTransport::from(mock);
        assert_eq!(transport.target(), "mock");
    }
}
