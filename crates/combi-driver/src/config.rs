//! Driver configuration.
//!
//! A [`DriverConfig`] can be deserialized from TOML (the monitor binary does
//! this) or built from jpos-style property pairs with
//! [`DriverConfig::from_properties`]:
//!
//! ```text
//! ComPort          = COM3 | /dev/ttyUSB0 | 127.0.0.1:56789
//! Baudrate         = 9600        serial only
//! Databits         = 8           serial only
//! Stopbits         = 2           serial only
//! Parity           = 0           serial only
//! OwnPort          = 0           TCP only
//! LoggingType      = 1
//! RequestTimeout   = 500
//! CharacterTimeout = 10
//! PollDelay        = 50
//! MaxRetry         = 2
//! BinaryEKey       = true
//! Key01-01Value    = 0           keyboard row 1, column 1
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use combi_core::{LoggingType, constants::*};
use combi_transport::{AnyTransport, Parity, SerialSettings};
use serde::{Deserialize, Serialize};

use crate::error::{DriverError, Result};

/// Property names that only apply to serial targets.
const SERIAL_ONLY: [&str; 4] = ["Baudrate", "Databits", "Stopbits", "Parity"];

/// Configuration of one physical connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Serial port name or `host:port` of a TCP device.
    pub com_port: String,

    /// Serial line parameters, ignored for TCP targets.
    pub serial: SerialSettings,

    /// Local TCP port to bind, ignored for serial targets. 0 lets the OS
    /// pick.
    pub own_port: u16,

    pub logging_type: LoggingType,

    /// Time to wait for the first byte of a response, in milliseconds.
    pub request_timeout_ms: u64,

    /// Maximum gap between the bytes of one frame, in milliseconds.
    pub character_timeout_ms: u64,

    /// Minimum gap between idle status requests, in milliseconds.
    pub poll_delay_ms: u64,

    /// Unanswered requests tolerated before the device counts as offline.
    pub max_retry: u32,

    /// Deliver electronic key values as raw bytes instead of hex text.
    pub binary_ekey: bool,

    pub key_table: KeyTable,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            com_port: String::new(),
            serial: SerialSettings::default(),
            own_port: 0,
            logging_type: LoggingType::default(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            character_timeout_ms: DEFAULT_CHARACTER_TIMEOUT_MS,
            poll_delay_ms: DEFAULT_POLL_DELAY_MS,
            max_retry: DEFAULT_MAX_RETRY,
            binary_ekey: true,
            key_table: KeyTable::default(),
        }
    }
}

impl DriverConfig {
    /// Default configuration for a connection target.
    pub fn new(com_port: impl Into<String>) -> Self {
        Self {
            com_port: com_port.into(),
            ..Default::default()
        }
    }

    /// Build a configuration from jpos-style properties.
    ///
    /// Unrecognized property names are ignored, so a complete jpos entry can
    /// be passed as is.
    ///
    /// # Errors
    ///
    /// * serial line properties given for a TCP target, or `OwnPort` for a
    ///   serial target
    /// * values that do not parse or are out of range
    pub fn from_properties(com_port: &str, properties: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::new(com_port);
        let tcp = config.is_tcp();

        for name in SERIAL_ONLY {
            if tcp && properties.contains_key(name) {
                return Err(invalid_property(name));
            }
        }
        if !tcp && properties.contains_key("OwnPort") {
            return Err(invalid_property("OwnPort"));
        }

        if let Some(v) = properties.get("Baudrate") {
            config.serial.baudrate = parse(v, "Baudrate")?;
        }
        if let Some(v) = properties.get("Databits") {
            config.serial.databits = parse(v, "Databits")?;
        }
        if let Some(v) = properties.get("Stopbits") {
            config.serial.stopbits = parse(v, "Stopbits")?;
        }
        if let Some(v) = properties.get("Parity") {
            config.serial.parity = Parity::parse(v).ok_or_else(|| invalid_property("Parity"))?;
        }
        if let Some(v) = properties.get("OwnPort") {
            config.own_port = parse(v, "OwnPort")?;
        }
        if let Some(v) = properties.get("LoggingType") {
            config.logging_type = LoggingType::from_code(parse(v, "LoggingType")?)?;
        }
        if let Some(v) = properties.get("RequestTimeout") {
            config.request_timeout_ms = parse(v, "RequestTimeout")?;
        }
        if let Some(v) = properties.get("CharacterTimeout") {
            config.character_timeout_ms = parse(v, "CharacterTimeout")?;
        }
        if let Some(v) = properties.get("PollDelay") {
            config.poll_delay_ms = parse(v, "PollDelay")?;
        }
        if let Some(v) = properties.get("MaxRetry") {
            config.max_retry = parse(v, "MaxRetry")?;
        }
        if let Some(v) = properties.get("BinaryEKey") {
            config.binary_ekey = v.trim().eq_ignore_ascii_case("true");
        }
        config.key_table = KeyTable::from_properties(properties)?;

        config.validate()?;
        Ok(config)
    }

    /// Check values that cannot be expressed in the field types.
    ///
    /// # Errors
    ///
    /// Fails for an empty target, invalid serial settings or a zero request
    /// timeout.
    pub fn validate(&self) -> Result<()> {
        if self.com_port.trim().is_empty() {
            return Err(DriverError::configuration("ComPort missing"));
        }
        if self.request_timeout_ms == 0 {
            return Err(DriverError::configuration("RequestTimeout must be positive"));
        }
        if !self.is_tcp() {
            self.serial.validate()?;
        }
        Ok(())
    }

    /// Whether the target is a TCP endpoint rather than a serial port.
    pub fn is_tcp(&self) -> bool {
        self.com_port.parse::<SocketAddr>().is_ok()
    }

    /// Create the transport for this target.
    ///
    /// # Errors
    ///
    /// Fails if the serial settings are not supported.
    pub fn transport(&self) -> Result<AnyTransport> {
        let local_port = (self.own_port != 0).then_some(self.own_port);
        Ok(AnyTransport::for_target(
            &self.com_port,
            self.serial,
            local_port,
            self.logging_type,
        )?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn character_timeout(&self) -> Duration {
        Duration::from_millis(self.character_timeout_ms)
    }

    pub fn poll_delay(&self) -> Duration {
        Duration::from_millis(self.poll_delay_ms)
    }

    /// How long the first open waits for the poller's first read cycle.
    pub fn startup_timeout(&self) -> Duration {
        self.request_timeout() * (self.max_retry + 2)
    }
}

/// Key values of the 10 x 16 keyboard matrix.
///
/// A value of 0 means the key is not mapped and its presses are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyTable {
    rows: Vec<Vec<u32>>,
}

impl Default for KeyTable {
    fn default() -> Self {
        Self {
            rows: vec![vec![0; KEYBOARD_COLUMNS]; KEYBOARD_ROWS],
        }
    }
}

impl KeyTable {
    /// Read `KeyRR-CCValue` properties (rows and columns counted from 1).
    ///
    /// # Errors
    ///
    /// Fails for values that are not unsigned integers.
    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self> {
        let mut table = Self::default();
        for row in 0..KEYBOARD_ROWS {
            for column in 0..KEYBOARD_COLUMNS {
                let name = format!("Key{:02}-{:02}Value", row + 1, column + 1);
                if let Some(v) = properties.get(&name) {
                    table.set(row, column, parse(v, &name)?);
                }
            }
        }
        Ok(table)
    }

    /// Key value at a zero-based position, `None` for unmapped keys.
    pub fn value(&self, row: usize, column: usize) -> Option<u32> {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .copied()
            .filter(|&v| v != 0)
    }

    /// Map a key. Positions outside the matrix are ignored.
    pub fn set(&mut self, row: usize, column: usize, value: u32) {
        if let Some(slot) = self.rows.get_mut(row).and_then(|r| r.get_mut(column)) {
            *slot = value;
        }
    }
}

fn parse<T: std::str::FromStr>(value: &str, name: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| combi_core::Error::invalid_property(name, value).into())
}

fn invalid_property(name: &str) -> DriverError {
    DriverError::configuration(format!("Invalid property for this target: {}", name))
}
