use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::LOCK_POSITIONS;
use crate::{Error, Result};

/// State of the physical connection owned by the poller.
///
/// ```text
/// Closed ──open──► IoError ◄──────── any state on hard I/O failure
///                    │  ▲
///             reopen │  │ reopen failed
///                    ▼  │
///                  Online ◄──frame received── Offline
///                    │                           ▲
///                    └──── retries exhausted ────┘
/// ```
///
/// `Closed` is both initial and terminal: every state returns to it on
/// shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No poller is running.
    Closed,

    /// The transport could not be opened or failed; the poller keeps
    /// trying to reopen it.
    IoError,

    /// The device answers requests.
    Online,

    /// The transport is open but the device stopped answering.
    Offline,
}

impl ConnectionState {
    /// Whether commands may be transmitted in this state.
    pub fn is_online(&self) -> bool {
        matches!(self, Self::Online)
    }

    /// Power state reported to peripherals for this connection state.
    pub fn power_state(&self) -> PowerState {
        match self {
            Self::Closed | Self::IoError => PowerState::Off,
            Self::Offline => PowerState::Offline,
            Self::Online => PowerState::Online,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Closed => "Closed",
            Self::IoError => "IoError",
            Self::Online => "Online",
            Self::Offline => "Offline",
        };
        write!(f, "{}", s)
    }
}

/// Power state as seen by a peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    Online,
    Offline,
    Off,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => write!(f, "Online"),
            Self::Offline => write!(f, "Offline"),
            Self::Off => write!(f, "Off"),
        }
    }
}

/// Position of the central keylock.
///
/// The wire carries one character per position; the index is the position
/// number reported to applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LockPosition {
    /// No key inserted (`-`).
    #[default]
    Removed,
    /// Position `0`.
    Zero,
    /// Position `I`.
    One,
    /// Position `II`.
    Two,
    /// Position `X`.
    X,
    /// Position `Z`.
    Z,
    /// Position `P`.
    P,
    /// Position `T`.
    T,
}

impl LockPosition {
    const ALL: [LockPosition; 8] = [
        Self::Removed,
        Self::Zero,
        Self::One,
        Self::Two,
        Self::X,
        Self::Z,
        Self::P,
        Self::T,
    ];

    /// Decode a wire position character.
    ///
    /// # Errors
    ///
    /// Returns an error for characters outside the position table.
    pub fn from_wire(byte: u8) -> Result<Self> {
        LOCK_POSITIONS
            .iter()
            .position(|&c| c == byte)
            .map(|i| Self::ALL[i])
            .ok_or_else(|| Error::invalid_field("lock position", (byte as char).to_string()))
    }

    /// Wire character of this position.
    pub fn to_wire(self) -> u8 {
        LOCK_POSITIONS[self.index() as usize]
    }

    /// Position index (0-7).
    pub fn index(self) -> u8 {
        match self {
            Self::Removed => 0,
            Self::Zero => 1,
            Self::One => 2,
            Self::Two => 3,
            Self::X => 4,
            Self::Z => 5,
            Self::P => 6,
            Self::T => 7,
        }
    }

    /// Number of positions a key can take (the removed state excluded).
    pub const fn key_positions() -> usize {
        7
    }
}

/// Symbology of a scanned label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LabelType {
    UpcA,
    UpcE,
    Ean8,
    Ean13,
    Unknown,
}

/// Result of extracting one MSR track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TrackStatus {
    /// Track absent or read without error.
    #[default]
    Success,
    /// A start sentinel appeared inside the track.
    StartSentinel,
    /// The end sentinel is missing.
    EndSentinel,
}

impl TrackStatus {
    /// Status byte used in extended error codes.
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::StartSentinel => 1,
            Self::EndSentinel => 2,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Logical peripherals multiplexed on one physical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeripheralKind {
    CashDrawer,
    /// Keylock 0: positional lock.
    Keylock,
    /// Keylock 1: electronic key reader.
    ElectronicKey,
    LineDisplay,
    Msr,
    Keyboard,
    Scanner,
    ToneIndicator,
}

impl PeripheralKind {
    pub const ALL: [PeripheralKind; 8] = [
        Self::CashDrawer,
        Self::Keylock,
        Self::ElectronicKey,
        Self::LineDisplay,
        Self::Msr,
        Self::Keyboard,
        Self::Scanner,
        Self::ToneIndicator,
    ];
}

impl fmt::Display for PeripheralKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CashDrawer => "CashDrawer",
            Self::Keylock => "Keylock",
            Self::ElectronicKey => "ElectronicKey",
            Self::LineDisplay => "LineDisplay",
            Self::Msr => "MSR",
            Self::Keyboard => "POSKeyboard",
            Self::Scanner => "Scanner",
            Self::ToneIndicator => "ToneIndicator",
        };
        write!(f, "{}", s)
    }
}

/// Format used when logging wire traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoggingType {
    /// Do not log wire traffic.
    None,
    /// Printable ASCII with escapes for everything else.
    #[default]
    EscapeString,
    /// Space separated hex bytes.
    HexString,
}

impl LoggingType {
    /// Decode the numeric `LoggingType` property value.
    ///
    /// # Errors
    ///
    /// Returns an error for unsupported values.
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(Self::None),
            1 => Ok(Self::EscapeString),
            2 => Ok(Self::HexString),
            other => Err(Error::invalid_property("LoggingType", other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(b'-', 0)]
    #[case(b'0', 1)]
    #[case(b'1', 2)]
    #[case(b'2', 3)]
    #[case(b'X', 4)]
    #[case(b'Z', 5)]
    #[case(b'P', 6)]
    #[case(b'T', 7)]
    fn test_lock_position_mapping(#[case] wire: u8, #[case] index: u8) {
        let position = LockPosition::from_wire(wire).unwrap();
        assert_eq!(position.index(), index);
        assert_eq!(position.to_wire(), wire);
    }

    #[test]
    fn test_lock_position_invalid() {
        assert!(LockPosition::from_wire(b'Q').is_err());
        assert_eq!(LockPosition::default(), LockPosition::Removed);
    }

    #[test]
    fn test_connection_state_power() {
        assert_eq!(ConnectionState::Closed.power_state(), PowerState::Off);
        assert_eq!(ConnectionState::IoError.power_state(), PowerState::Off);
        assert_eq!(ConnectionState::Offline.power_state(), PowerState::Offline);
        assert_eq!(ConnectionState::Online.power_state(), PowerState::Online);
        assert!(ConnectionState::Online.is_online());
        assert!(!ConnectionState::Offline.is_online());
    }

    #[test]
    fn test_logging_type_codes() {
        assert_eq!(LoggingType::from_code(0).unwrap(), LoggingType::None);
        assert_eq!(LoggingType::from_code(1).unwrap(), LoggingType::EscapeString);
        assert_eq!(LoggingType::from_code(2).unwrap(), LoggingType::HexString);
        assert!(LoggingType::from_code(7).is_err());
    }

    #[test]
    fn test_track_status_codes() {
        assert_eq!(TrackStatus::Success.code(), 0);
        assert!(TrackStatus::default().is_success());
        assert!(!TrackStatus::EndSentinel.is_success());
    }

    #[test]
    fn test_connection_state_serialization() {
        let json = serde_json::to_string(&ConnectionState::IoError).unwrap();
        assert_eq!(json, "\"io_error\"");
        let back: ConnectionState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ConnectionState::IoError);
    }
}
