//! Error types for transport operations.

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors raised by a byte-stream transport.
///
/// A read timeout is *not* an error: reads return whatever arrived (possibly
/// nothing) when the timeout expires. [`TransportError::Timeout`] is only
/// used for operations that must complete, such as connecting.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Operation on a transport that has not been opened.
    #[error("Transport not open: {target}")]
    NotOpen { target: String },

    /// Operation did not complete in time.
    #[error("Operation timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// The peer closed the connection.
    #[error("Connection closed by peer: {target}")]
    Closed { target: String },

    /// Opening the transport failed.
    #[error("Failed to open {target}: {message}")]
    OpenFailed { target: String, message: String },

    /// Invalid transport parameters.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    pub fn not_open(target: impl Into<String>) -> Self {
        Self::NotOpen {
            target: target.into(),
        }
    }

    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    pub fn closed(target: impl Into<String>) -> Self {
        Self::Closed {
            target: target.into(),
        }
    }

    pub fn open_failed(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OpenFailed {
            target: target.into(),
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

impl From<tokio_serial::Error> for TransportError {
    fn from(err: tokio_serial::Error) -> Self {
        Self::Io(std::io::Error::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            TransportError::not_open("COM1").to_string(),
            "Transport not open: COM1"
        );
        assert_eq!(
            TransportError::timeout(500).to_string(),
            "Operation timeout after 500ms"
        );
        assert_eq!(
            TransportError::open_failed("127.0.0.1:1", "refused").to_string(),
            "Failed to open 127.0.0.1:1: refused"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err: TransportError = io.into();
        assert!(matches!(err, TransportError::Io(_)));
    }
}
