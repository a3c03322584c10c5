use bytes::{BufMut, Bytes, BytesMut};
use combi_core::{Error, Result, constants::*};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Commands understood by the device.
///
/// Each command knows its wire encoding and the tag of the frame that
/// confirms it. Commands without a confirming frame are *responseless*: the
/// poller considers them done once written.
///
/// | Command | Wire | Response |
/// |---------|------|----------|
/// | [`Command::StatusRequest`] | `SR` | `S` |
/// | [`Command::DrawerOpen`] | `DO` | none |
/// | [`Command::BeepOn`] / [`Command::BeepOff`] | `B1` / `B0` | none |
/// | [`Command::ScannerEnable`] / [`Command::ScannerDisable`] | `RE` / `RD` | none |
/// | [`Command::DisplayLine`] | `T` row len text | none |
/// | [`Command::CodePage`] | `C` digit | `C` |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    StatusRequest,
    DrawerOpen,
    BeepOn,
    BeepOff,
    ScannerEnable,
    ScannerDisable,

    /// Replace one display row.
    ///
    /// `text` holds the row contents followed by its attribute characters.
    DisplayLine { row: u8, text: String },

    /// Select a code page by its index in
    /// [`DISPLAY_CHARACTER_SETS`].
    CodePage(u8),
}

impl Command {
    /// Build a display line command.
    ///
    /// # Errors
    ///
    /// Fails for rows outside the display or texts whose character count
    /// does not fit the 2-digit length field.
    pub fn display_line(row: usize, text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if row >= DISPLAY_ROWS {
            return Err(Error::invalid_field("display row", row.to_string()));
        }
        let chars = text.chars().count();
        if chars > 99 {
            return Err(Error::invalid_field("display text length", chars.to_string()));
        }
        Ok(Command::DisplayLine {
            row: row as u8,
            text,
        })
    }

    /// Build a code page change for one of the supported character sets.
    ///
    /// # Errors
    ///
    /// Fails for character sets the display does not offer.
    pub fn code_page(character_set: u32) -> Result<Self> {
        DISPLAY_CHARACTER_SETS
            .iter()
            .position(|&cs| cs == character_set)
            .map(|index| Command::CodePage(index as u8))
            .ok_or_else(|| Error::invalid_field("character set", character_set.to_string()))
    }

    /// Tag of the frame confirming this command, `None` for responseless
    /// commands.
    pub fn expected_response(&self) -> Option<u8> {
        match self {
            Command::StatusRequest => Some(TAG_STATUS),
            Command::CodePage(_) => Some(TAG_DISPLAY),
            _ => None,
        }
    }

    pub fn is_responseless(&self) -> bool {
        self.expected_response().is_none()
    }

    /// Wire encoding.
    ///
    /// Display lines carry the *character* count in the length field while
    /// the text itself is sent as UTF-8.
    pub fn encode(&self) -> Bytes {
        match self {
            Command::StatusRequest => Bytes::from_static(CMD_STATUS_REQUEST),
            Command::DrawerOpen => Bytes::from_static(CMD_DRAWER_OPEN),
            Command::BeepOn => Bytes::from_static(CMD_BEEP_ON),
            Command::BeepOff => Bytes::from_static(CMD_BEEP_OFF),
            Command::ScannerEnable => Bytes::from_static(CMD_SCANNER_ENABLE),
            Command::ScannerDisable => Bytes::from_static(CMD_SCANNER_DISABLE),
            Command::DisplayLine { row, text } => {
                let chars = text.chars().count() % 100;
                let mut buf = BytesMut::with_capacity(4 + text.len());
                buf.put_u8(CMD_TEXT_PREFIX);
                buf.put_u8(b'0' + row);
                buf.put_u8(b'0' + (chars / 10) as u8);
                buf.put_u8(b'0' + (chars % 10) as u8);
                buf.put_slice(text.as_bytes());
                buf.freeze()
            }
            Command::CodePage(index) => {
                let mut buf = BytesMut::with_capacity(2);
                buf.put_u8(CMD_CODE_PAGE_PREFIX);
                buf.put_u8(b'0' + index);
                buf.freeze()
            }
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::StatusRequest => write!(f, "StatusRequest"),
            Command::DrawerOpen => write!(f, "DrawerOpen"),
            Command::BeepOn => write!(f, "BeepOn"),
            Command::BeepOff => write!(f, "BeepOff"),
            Command::ScannerEnable => write!(f, "ScannerEnable"),
            Command::ScannerDisable => write!(f, "ScannerDisable"),
            Command::DisplayLine { row, .. } => write!(f, "DisplayLine({})", row),
            Command::CodePage(index) => write!(f, "CodePage({})", index),
        }
    }
}
