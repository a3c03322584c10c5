//! TCP transport.
//!
//! Used when the device simulator listens on a TCP port instead of a serial
//! line. The connection target is a `host:port` address.
//!
//! # Example
//!
//! ```no_run
//! use combi_transport::{TcpTransport, Transport};
//! use std::time::Duration;
//!
//! # async fn example() -> combi_transport::Result<()> {
//! let mut transport = TcpTransport::new("127.0.0.1:56789".parse().unwrap());
//! transport.open().await?;
//! transport.set_timeout(Duration::from_millis(500));
//! transport.write(b"SR").await?;
//! let response = transport.read(15).await?;
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use combi_core::LoggingType;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpSocket, TcpStream};
use tracing::{debug, warn};

use crate::error::{Result, TransportError};
use crate::traits::Transport;
use crate::wire_log::WireLogger;

/// Time allowed for establishing the connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Initial receive buffer capacity.
const INITIAL_BUFFER_CAPACITY: usize = 256;

/// TCP client transport.
#[derive(Debug)]
pub struct TcpTransport {
    addr: SocketAddr,
    local_port: Option<u16>,
    target: String,
    stream: Option<TcpStream>,
    buffer: BytesMut,
    timeout: Duration,
    log: WireLogger,
}

impl TcpTransport {
    pub fn new(addr: SocketAddr) -> Self {
        Self::with_logging(addr, LoggingType::default())
    }

    pub fn with_logging(addr: SocketAddr, logging: LoggingType) -> Self {
        let target = addr.to_string();
        Self {
            addr,
            local_port: None,
            log: WireLogger::new(logging, target.clone()),
            target,
            stream: None,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            timeout: Duration::from_millis(combi_core::constants::DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }

    /// Bind the local end of the connection to `port` (0 lets the OS pick).
    pub fn with_local_port(mut self, port: u16) -> Self {
        self.local_port = Some(port);
        self
    }

    async fn connect(&self) -> std::io::Result<TcpStream> {
        let Some(port) = self.local_port else {
            return TcpStream::connect(self.addr).await;
        };
        let socket = if self.addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        let local: SocketAddr = if self.addr.is_ipv4() {
            (std::net::Ipv4Addr::UNSPECIFIED, port).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, port).into()
        };
        socket.set_reuseaddr(true)?;
        socket.bind(local)?;
        socket.connect(self.addr).await
    }

    /// Move any bytes the socket holds into the receive buffer without
    /// waiting.
    fn poll_pending(&mut self) -> Result<()> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| TransportError::not_open(&self.target))?;
        loop {
            match stream.try_read_buf(&mut self.buffer) {
                Ok(0) => return Err(TransportError::closed(&self.target)),
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn take(&mut self, max: usize) -> Vec<u8> {
        let n = max.min(self.buffer.len());
        let data = self.buffer.copy_to_bytes(n).to_vec();
        self.log.inbound(&data);
        data
    }
}

impl Transport for TcpTransport {
    async fn open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        debug!(addr = %self.target, "Connecting");
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, self.connect())
            .await
            .map_err(|_| TransportError::timeout(CONNECT_TIMEOUT.as_millis() as u64))?
            .map_err(|e| TransportError::open_failed(&self.target, e.to_string()))?;
        if let Err(e) = stream.set_nodelay(true) {
            warn!(addr = %self.target, error = %e, "Failed to disable Nagle");
        }
        self.buffer.clear();
        self.stream = Some(stream);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            debug!(addr = %self.target, "Closing");
            self.buffer.clear();
            stream.shutdown().await?;
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
            let stream = self
                .stream
                .as_mut()
                .ok_or_else(|| TransportError::not_open(&self.target))?;
            match tokio::time::timeout(self.timeout, stream.read_buf(&mut self.buffer)).await {
                Err(_) => return Ok(Vec::new()),
                Ok(Ok(0)) => return Err(TransportError::closed(&self.target)),
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(e.into()),
            }
        }
        Ok(self.take(max))
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| TransportError::not_open(&self.target))?;
        stream.write_all(data).await?;
        self.log.outbound(data);
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        match self.stream.as_mut() {
            Some(stream) => Ok(stream.flush().await?),
            None => Err(TransportError::not_open(&self.target)),
        }
    }

    fn available(&mut self) -> Result<usize> {
        self.poll_pending()?;
        Ok(self.buffer.len())
    }

    fn target(&self) -> &str {
        &self.target
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}
