//! Incremental frame assembly.
//!
//! Device frames have no terminator: the tag byte alone determines how many
//! bytes follow. Two frames are multi-stage, their length is only known
//! after a short header has been read:
//!
//! ```text
//! MSR      M ddd <ddd bytes>
//!            └── 3 decimal digits
//!
//! Scanner  R A <12 bytes>           UPC-A
//!          R E <7 bytes>            UPC-E
//!          R F F <8 bytes>          EAN-8  (flag 'F' not part of the label)
//!          R F x <12 bytes>         EAN-13 (x is the first label digit)
//! ```
//!
//! [`FrameAssembler`] tracks the current stage and reports through
//! [`FrameAssembler::remaining`] how many bytes the reader must fetch next,
//! so the reader never reads past the end of a frame.
//!
//! # Example
//!
//! ```
//! use combi_protocol::{Frame, FrameAssembler};
//!
//! let mut assembler = FrameAssembler::start(b'D').unwrap();
//! assert_eq!(assembler.remaining(), 1);
//! let frame = assembler.push(b'O').unwrap();
//! assert_eq!(frame, Some(Frame::Drawer { open: true }));
//! ```

use bytes::BytesMut;
use combi_core::{Error, LabelType, Result, constants::*};

use crate::frame::{Frame, ScanData, decode_fixed};

/// Assembly stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Fixed-length frame; complete when the buffer holds `len` bytes.
    Fixed { len: usize },

    /// Reading the 3-digit MSR length.
    MsrLength,

    /// Reading `len` bytes of MSR payload (starting at `start`).
    MsrPayload { start: usize, len: usize },

    /// Reading the scanner label type byte.
    LabelType,

    /// Reading the byte following an EAN type byte.
    EanFlag,

    /// Reading the label itself.
    Label {
        len: usize,
        label_start: usize,
        label_type: LabelType,
    },
}

/// Builds one frame from the bytes following its tag.
#[derive(Debug)]
pub struct FrameAssembler {
    tag: u8,
    stage: Stage,
    buf: BytesMut,
}

impl FrameAssembler {
    /// Begin a frame with the given tag byte.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTag`] for bytes that do not start a frame.
    pub fn start(tag: u8) -> Result<Self> {
        let stage = match tag {
            TAG_DRAWER => Stage::Fixed {
                len: DRAWER_FRAME_LEN - 1,
            },
            TAG_LOCK => Stage::Fixed {
                len: LOCK_FRAME_LEN - 1,
            },
            TAG_EKEY => Stage::Fixed {
                len: EKEY_FRAME_LEN - 1,
            },
            TAG_KEYBOARD => Stage::Fixed {
                len: KEYBOARD_FRAME_LEN - 1,
            },
            TAG_STATUS => Stage::Fixed {
                len: STATUS_FRAME_LEN - 1,
            },
            TAG_DISPLAY => Stage::Fixed {
                len: DISPLAY_FRAME_LEN - 1,
            },
            TAG_MSR => Stage::MsrLength,
            TAG_SCANNER => Stage::LabelType,
            other => return Err(Error::UnknownTag(other)),
        };

        Ok(Self {
            tag,
            stage,
            buf: BytesMut::with_capacity(STATUS_FRAME_LEN),
        })
    }

    /// Tag of the frame being assembled.
    pub fn tag(&self) -> u8 {
        self.tag
    }

    /// Bytes still required to finish the current stage.
    ///
    /// Never zero while the frame is incomplete.
    pub fn remaining(&self) -> usize {
        let target = match self.stage {
            Stage::Fixed { len } => len,
            Stage::MsrLength => MSR_LENGTH_DIGITS,
            Stage::MsrPayload { start, len } => start + len,
            Stage::LabelType => 1,
            Stage::EanFlag => 2,
            Stage::Label { len, .. } => len,
        };
        target.saturating_sub(self.buf.len())
    }

    /// Append one byte.
    ///
    /// Returns `Some(frame)` once the frame is complete. The assembler must
    /// not be fed after that.
    ///
    /// # Errors
    ///
    /// Returns an error when a header or payload field is malformed. The
    /// frame is lost in that case.
    pub fn push(&mut self, byte: u8) -> Result<Option<Frame>> {
        self.buf.extend_from_slice(&[byte]);
        if self.remaining() > 0 {
            return Ok(None);
        }
        self.advance()
    }

    /// Move to the next stage after the current one filled up.
    fn advance(&mut self) -> Result<Option<Frame>> {
        match self.stage {
            Stage::Fixed { .. } => decode_fixed(self.tag, &self.buf).map(Some),

            Stage::MsrLength => {
                let len = parse_decimal(&self.buf[..MSR_LENGTH_DIGITS])?;
                if len == 0 {
                    return Ok(Some(Frame::Msr {
                        payload: Vec::new(),
                    }));
                }
                self.stage = Stage::MsrPayload {
                    start: MSR_LENGTH_DIGITS,
                    len,
                };
                Ok(None)
            }

            Stage::MsrPayload { start, .. } => Ok(Some(Frame::Msr {
                payload: self.buf[start..].to_vec(),
            })),

            Stage::LabelType => {
                self.stage = match self.buf[0] {
                    LABEL_UPCA => Stage::Label {
                        len: 1 + UPCA_LEN,
                        label_start: 1,
                        label_type: LabelType::UpcA,
                    },
                    LABEL_UPCE => Stage::Label {
                        len: 1 + UPCE_LEN,
                        label_start: 1,
                        label_type: LabelType::UpcE,
                    },
                    LABEL_EAN => Stage::EanFlag,
                    other => return Err(Error::UnsupportedLabel(other as char)),
                };
                Ok(None)
            }

            Stage::EanFlag => {
                self.stage = if self.buf[1] == LABEL_EAN8_FLAG {
                    Stage::Label {
                        len: 1 + EAN8_LEN,
                        label_start: 2,
                        label_type: LabelType::Ean8,
                    }
                } else {
                    Stage::Label {
                        len: 1 + EAN13_LEN,
                        label_start: 1,
                        label_type: LabelType::Ean13,
                    }
                };
                Ok(None)
            }

            Stage::Label {
                label_start,
                label_type,
                ..
            } => Ok(Some(Frame::Scanner(ScanData {
                data: self.buf.to_vec(),
                label: self.buf[label_start..].to_vec(),
                label_type,
            }))),
        }
    }
}

fn parse_decimal(digits: &[u8]) -> Result<usize> {
    digits.iter().try_fold(0usize, |acc, &d| {
        if d.is_ascii_digit() {
            Ok(acc * 10 + (d - b'0') as usize)
        } else {
            Err(Error::invalid_field(
                "MSR length",
                String::from_utf8_lossy(digits).into_owned(),
            ))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(assembler: &mut FrameAssembler, bytes: &[u8]) -> Option<Frame> {
        let mut result = None;
        for &b in bytes {
            assert!(result.is_none(), "fed past end of frame");
            result = assembler.push(b).unwrap();
        }
        result
    }

    #[test]
    fn test_unknown_tag_rejected() {
        assert_eq!(
            FrameAssembler::start(b'Z').unwrap_err(),
            Error::UnknownTag(b'Z')
        );
        assert!(FrameAssembler::start(0).is_err());
    }

    #[test]
    fn test_msr_stages() {
        let mut assembler = FrameAssembler::start(b'M').unwrap();
        assert_eq!(assembler.remaining(), 3);
        assert!(feed(&mut assembler, b"005").is_none());
        assert_eq!(assembler.remaining(), 5);
        let frame = feed(&mut assembler, b"1&A?2").unwrap();
        assert_eq!(
            frame,
            Frame::Msr {
                payload: b"1&A?2".to_vec()
            }
        );
    }

    #[test]
    fn test_msr_empty_payload() {
        let mut assembler = FrameAssembler::start(b'M').unwrap();
        let frame = feed(&mut assembler, b"000").unwrap();
        assert_eq!(frame, Frame::Msr { payload: vec![] });
    }

    #[test]
    fn test_msr_bad_length() {
        let mut assembler = FrameAssembler::start(b'M').unwrap();
        assembler.push(b'0').unwrap();
        assembler.push(b'x').unwrap();
        assert!(assembler.push(b'1').is_err());
    }

    #[test]
    fn test_scanner_ean8_stages() {
        let mut assembler = FrameAssembler::start(b'R').unwrap();
        assert_eq!(assembler.remaining(), 1);
        assert!(assembler.push(b'F').unwrap().is_none());
        assert_eq!(assembler.remaining(), 1);
        assert!(assembler.push(b'F').unwrap().is_none());
        assert_eq!(assembler.remaining(), 8);
        let frame = feed(&mut assembler, b"12345670").unwrap();
        assert_eq!(
            frame,
            Frame::Scanner(ScanData {
                data: b"FF12345670".to_vec(),
                label: b"12345670".to_vec(),
                label_type: LabelType::Ean8,
            })
        );
    }

    #[test]
    fn test_scanner_ean13_keeps_first_digit() {
        let mut assembler = FrameAssembler::start(b'R').unwrap();
        let frame = feed(&mut assembler, b"F4006381333931").unwrap();
        let Frame::Scanner(scan) = frame else {
            panic!("expected scanner frame");
        };
        assert_eq!(scan.label_type, LabelType::Ean13);
        assert_eq!(scan.label, b"4006381333931".to_vec());
        assert_eq!(scan.data, b"F4006381333931".to_vec());
    }

    #[test]
    fn test_scanner_unsupported_label() {
        let mut assembler = FrameAssembler::start(b'R').unwrap();
        assert_eq!(
            assembler.push(b'Q').unwrap_err(),
            Error::UnsupportedLabel('Q')
        );
    }
}
