use combi_core::{Error, LabelType, LockPosition, Result, constants::*};
use serde::{Deserialize, Serialize};

use crate::assembler::FrameAssembler;

/// One decoded device frame.
///
/// Frames are identified by their first byte (the tag) and carry
/// fixed-offset payload fields:
///
/// ```text
/// D O                      drawer open
/// L X                      lock in position X
/// E 0 0 0 0 0 0 1 2 A B 3 4    electronic key
/// B 3 C                    key at row 3, column C
/// M 0 1 2 1 & A B ? ...    MSR with 12 payload bytes
/// R A 0 1 2 3 4 5 6 7 8 9 0 5  UPC-A label
/// S O - 0 0 0 0 0 0 0 0 0 0 0 0  status
/// C 1 0                    code page accepted
/// ```
///
/// Frames are built incrementally by [`FrameAssembler`]; [`Frame::decode`]
/// is a convenience for complete buffers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    /// Drawer state change.
    Drawer { open: bool },

    /// Keylock position change.
    Lock { position: LockPosition },

    /// Electronic key value as 12 hex-ASCII characters.
    ElectronicKey { value: Vec<u8> },

    /// Key press at zero-based row and column.
    Keyboard { row: usize, column: usize },

    /// Raw MSR payload (track markers and sentinels included).
    ///
    /// Track extraction happens in [`crate::msr`] because it depends on
    /// consumer options.
    Msr { payload: Vec<u8> },

    /// Scanned label.
    Scanner(ScanData),

    /// Response to a status request.
    Status {
        drawer_open: bool,
        lock: LockPosition,
        electronic_key: Vec<u8>,
    },

    /// Acknowledgement of a code page change.
    CodePage { success: bool },
}

/// Label read by the scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanData {
    /// Everything after the tag: type byte, optional EAN flag and label.
    pub data: Vec<u8>,

    /// Label digits only.
    pub label: Vec<u8>,

    pub label_type: LabelType,
}

impl Frame {
    /// Tag byte identifying this frame on the wire.
    pub fn tag(&self) -> u8 {
        match self {
            Frame::Drawer { .. } => TAG_DRAWER,
            Frame::Lock { .. } => TAG_LOCK,
            Frame::ElectronicKey { .. } => TAG_EKEY,
            Frame::Keyboard { .. } => TAG_KEYBOARD,
            Frame::Msr { .. } => TAG_MSR,
            Frame::Scanner(_) => TAG_SCANNER,
            Frame::Status { .. } => TAG_STATUS,
            Frame::CodePage { .. } => TAG_DISPLAY,
        }
    }

    /// Decode one complete frame, tag included.
    ///
    /// # Errors
    ///
    /// * [`Error::UnknownTag`] if the first byte is not a frame tag
    /// * [`Error::Truncated`] if the buffer ends before the frame does, or
    ///   carries trailing bytes
    /// * [`Error::InvalidField`] / [`Error::UnsupportedLabel`] for malformed
    ///   payload fields
    ///
    /// # Example
    ///
    /// ```
    /// use combi_protocol::Frame;
    /// use combi_core::LockPosition;
    ///
    /// let frame = Frame::decode(b"LX").unwrap();
    /// assert_eq!(frame, Frame::Lock { position: LockPosition::X });
    /// ```
    pub fn decode(bytes: &[u8]) -> Result<Frame> {
        let (&tag, payload) = bytes.split_first().ok_or(Error::Truncated {
            tag: '?',
            expected: 1,
            actual: 0,
        })?;

        let mut assembler = FrameAssembler::start(tag)?;
        for (i, &byte) in payload.iter().enumerate() {
            if let Some(frame) = assembler.push(byte)? {
                let consumed = i + 2;
                if consumed != bytes.len() {
                    return Err(Error::Truncated {
                        tag: tag as char,
                        expected: consumed,
                        actual: bytes.len(),
                    });
                }
                return Ok(frame);
            }
        }

        Err(Error::Truncated {
            tag: tag as char,
            expected: bytes.len() + assembler.remaining(),
            actual: bytes.len(),
        })
    }
}

/// Decode a complete frame buffer collected by the assembler.
///
/// `buf` holds every byte after the tag. Scanner frames are decoded by the
/// assembler itself since their layout is only known while reading.
pub(crate) fn decode_fixed(tag: u8, buf: &[u8]) -> Result<Frame> {
    match tag {
        TAG_DRAWER => Ok(Frame::Drawer {
            open: buf[0] == DRAWER_OPEN,
        }),
        TAG_LOCK => Ok(Frame::Lock {
            position: LockPosition::from_wire(buf[0])?,
        }),
        TAG_EKEY => Ok(Frame::ElectronicKey {
            value: buf[..EKEY_HEX_LEN].to_vec(),
        }),
        TAG_KEYBOARD => {
            let row = buf[0].wrapping_sub(b'0') as usize;
            let column = buf[1].wrapping_sub(b'A') as usize;
            if row >= KEYBOARD_ROWS {
                return Err(Error::invalid_field(
                    "keyboard row",
                    (buf[0] as char).to_string(),
                ));
            }
            if column >= KEYBOARD_COLUMNS {
                return Err(Error::invalid_field(
                    "keyboard column",
                    (buf[1] as char).to_string(),
                ));
            }
            Ok(Frame::Keyboard { row, column })
        }
        TAG_STATUS => {
            // Offsets in the constants table count the tag.
            let drawer = buf[STATUS_DRAWER_POS - 1];
            let lock = buf[STATUS_LOCK_POS - 1];
            let ekey = &buf[STATUS_EKEY_POS - 1..STATUS_EKEY_POS - 1 + EKEY_HEX_LEN];
            Ok(Frame::Status {
                drawer_open: drawer == DRAWER_OPEN,
                lock: LockPosition::from_wire(lock)?,
                electronic_key: ekey.to_vec(),
            })
        }
        TAG_DISPLAY => Ok(Frame::CodePage {
            success: buf[0] == DISPLAY_SUCCESS,
        }),
        other => Err(Error::UnknownTag(other)),
    }
}
