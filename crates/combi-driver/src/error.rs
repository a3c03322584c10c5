//! Error types for driver operations.
//!
//! Transport and framing failures are handled inside the poller and never
//! reach application callers directly. Callers see them as one of the
//! availability variants ([`DriverError::Offline`], [`DriverError::PowerOff`],
//! [`DriverError::NoResponse`]) or, for lifecycle mistakes, as
//! [`DriverError::IllegalState`] / [`DriverError::NotClaimed`].

use combi_core::PeripheralKind;
use combi_transport::TransportError;

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;

/// Errors returned to applications.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// The device stopped answering status requests.
    #[error("Device offline")]
    Offline,

    /// The connection to the device is broken or not yet established.
    #[error("Device not connected")]
    PowerOff,

    /// The driver is not open.
    #[error("Driver closed")]
    Closed,

    /// Operation called in the wrong lifecycle state.
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Another handle already owns the peripheral.
    #[error("{0} claimed by another instance")]
    Claimed(PeripheralKind),

    /// Operation requires the peripheral to be claimed.
    #[error("{0} not claimed")]
    NotClaimed(PeripheralKind),

    /// A wait ended before its condition was met.
    #[error("{0}")]
    Timeout(String),

    /// A command was aborted or never confirmed by the device.
    #[error("{0}")]
    NoResponse(String),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid argument to a peripheral operation.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] combi_core::Error),
}

impl DriverError {
    pub fn illegal(message: impl Into<String>) -> Self {
        Self::IllegalState(message.into())
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }

    pub fn no_response(message: impl Into<String>) -> Self {
        Self::NoResponse(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Whether the error means the device is currently unreachable.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Offline | Self::PowerOff | Self::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(DriverError::Offline.to_string(), "Device offline");
        assert_eq!(
            DriverError::Claimed(PeripheralKind::CashDrawer).to_string(),
            "CashDrawer claimed by another instance"
        );
        assert_eq!(
            DriverError::no_response("No response on drawer open request").to_string(),
            "No response on drawer open request"
        );
    }

    #[test]
    fn test_unavailable_classification() {
        assert!(DriverError::Offline.is_unavailable());
        assert!(DriverError::PowerOff.is_unavailable());
        assert!(!DriverError::illegal("not enabled").is_unavailable());
    }

    #[test]
    fn test_transport_conversion() {
        let err: DriverError = TransportError::timeout(500).into();
        assert!(matches!(err, DriverError::Transport(_)));
    }
}
