//! MSR track extraction.
//!
//! An MSR payload carries up to three tracks, each wrapped in sentinels and
//! preceded by a track marker (except the first):
//!
//! ```text
//! 1 & B4111... ? 2 ; 4111...=25 ? 3 ; 011... ?
//! │ └ track 1 ┘  │ └─ track 2 ─┘  │ └ track 3 ┘
//! │              marker           marker
//! └ card present
//! ```
//!
//! A track may be empty (no start sentinel at its position). A start
//! sentinel appearing inside a track or a missing end sentinel marks the
//! track as failed.

use combi_core::{
    TrackStatus,
    constants::{
        MSR_TRACK_END, MSR_TRACK1_MARKER, MSR_TRACK1_START, MSR_TRACK2_MARKER, MSR_TRACK3_MARKER,
        MSR_TRACK23_START,
    },
};
use serde::{Deserialize, Serialize};

const MARKERS: [u8; 3] = [MSR_TRACK1_MARKER, MSR_TRACK2_MARKER, MSR_TRACK3_MARKER];
const START_SENTINELS: [u8; 3] = [MSR_TRACK1_START, MSR_TRACK23_START, MSR_TRACK23_START];

/// Tracks of one card swipe, sentinels included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSet {
    pub tracks: [Vec<u8>; 3],
    pub status: [TrackStatus; 3],

    /// Whether parsing reached the end of the payload.
    pub complete: bool,
}

/// Outcome of a card swipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MsrRead {
    /// All tracks read cleanly.
    Data(TrackSet),

    /// At least one track failed, or the payload held unparsable bytes.
    Error(TrackSet),
}

enum Extracted {
    Absent,
    Read { end: usize, status: TrackStatus },
    Unterminated,
}

impl MsrRead {
    /// Parse an MSR payload.
    ///
    /// Returns `None` if the payload carries no card data.
    ///
    /// # Example
    ///
    /// ```
    /// use combi_protocol::MsrRead;
    ///
    /// let read = MsrRead::parse(b"1&ABC?2;123?3").unwrap();
    /// let MsrRead::Data(set) = read else { panic!() };
    /// assert_eq!(set.tracks[0], b"&ABC?".to_vec());
    /// assert_eq!(set.tracks[1], b";123?".to_vec());
    /// assert!(set.tracks[2].is_empty());
    /// ```
    pub fn parse(payload: &[u8]) -> Option<MsrRead> {
        if payload.first() != Some(&MARKERS[0]) {
            return None;
        }

        let mut set = TrackSet::default();
        let mut pos = 1;
        let mut terminated = true;

        for index in 0..3 {
            if index > 0 {
                if payload.get(pos) != Some(&MARKERS[index]) {
                    break;
                }
                pos += 1;
            }
            match extract(payload, pos, START_SENTINELS[index]) {
                Extracted::Absent => {}
                Extracted::Read { end, status } => {
                    if status.is_success() {
                        set.tracks[index] = payload[pos..=end].to_vec();
                    }
                    set.status[index] = status;
                    pos = end + 1;
                }
                Extracted::Unterminated => {
                    set.status[index] = TrackStatus::EndSentinel;
                    terminated = false;
                    break;
                }
            }
        }

        set.complete = terminated && pos == payload.len();
        if set.complete && set.status.iter().all(|s| s.is_success()) {
            Some(MsrRead::Data(set))
        } else {
            Some(MsrRead::Error(set))
        }
    }

    pub fn tracks(&self) -> &TrackSet {
        match self {
            MsrRead::Data(set) | MsrRead::Error(set) => set,
        }
    }
}

impl TrackSet {
    /// Extended error code: `(t3 << 16) | (t2 << 8) | t1` of the track
    /// status codes.
    ///
    /// Only meaningful when the payload was parsed to its end; `None`
    /// otherwise.
    pub fn extended_error(&self) -> Option<u32> {
        self.complete.then(|| {
            pack([
                self.status[0].code() as u32,
                self.status[1].code() as u32,
                self.status[2].code() as u32,
            ])
        })
    }
}

/// Pack three per-track values into one status word, track 1 in the low
/// byte.
pub fn pack(values: [u32; 3]) -> u32 {
    ((values[2] & 0xFF) << 16) | ((values[1] & 0xFF) << 8) | (values[0] & 0xFF)
}

/// Prepare raw track data for delivery.
///
/// `track` is the zero-based track index. Sentinels are stripped unless
/// `transmit_sentinels` is set. Without `decode_data` the characters are
/// converted to their raw card values (`- 0x20` for track 1, `- 0x30` for
/// tracks 2 and 3); tracks holding characters outside the card alphabet are
/// delivered unconverted.
pub fn format_track(track: usize, raw: &[u8], transmit_sentinels: bool, decode_data: bool) -> Vec<u8> {
    let source = if !transmit_sentinels && raw.len() > 1 {
        &raw[1..raw.len() - 1]
    } else {
        raw
    };
    if decode_data {
        return source.to_vec();
    }

    let (offset, max) = if track == 0 { (0x20u8, 0x3Fu8) } else { (0x30, 0x0F) };
    source
        .iter()
        .map(|&c| c.checked_sub(offset).filter(|&v| v <= max))
        .collect::<Option<Vec<u8>>>()
        .unwrap_or_else(|| source.to_vec())
}

fn extract(payload: &[u8], start: usize, sentinel: u8) -> Extracted {
    if payload.get(start) != Some(&sentinel) {
        return Extracted::Absent;
    }

    let mut status = TrackStatus::Success;
    for (offset, &c) in payload[start + 1..].iter().enumerate() {
        if c == MSR_TRACK_END {
            return Extracted::Read {
                end: start + 1 + offset,
                status,
            };
        }
        if c == sentinel {
            status = TrackStatus::StartSentinel;
        }
    }
    Extracted::Unterminated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_card() {
        assert!(MsrRead::parse(b"0").is_none());
        assert!(MsrRead::parse(b"").is_none());
    }

    #[test]
    fn test_three_tracks() {
        let read = MsrRead::parse(b"1&A^B?2;12=3?3;456?").unwrap();
        let MsrRead::Data(set) = read else {
            panic!("expected data");
        };
        assert_eq!(set.tracks[0], b"&A^B?".to_vec());
        assert_eq!(set.tracks[1], b";12=3?".to_vec());
        assert_eq!(set.tracks[2], b";456?".to_vec());
        assert_eq!(set.extended_error(), Some(0));
    }

    #[test]
    fn test_track_one_only() {
        let read = MsrRead::parse(b"1&ABC?").unwrap();
        assert!(matches!(read, MsrRead::Data(_)));
    }

    #[test]
    fn test_missing_end_sentinel_on_track_three() {
        let read = MsrRead::parse(b"1&A?2;1?3;99").unwrap();
        let MsrRead::Error(set) = read else {
            panic!("expected error");
        };
        assert_eq!(set.status[2], TrackStatus::EndSentinel);
        assert!(set.tracks[2].is_empty());
        assert_eq!(set.tracks[0], b"&A?".to_vec());
        assert!(!set.complete);
        assert_eq!(set.extended_error(), None);
    }

    #[test]
    fn test_start_sentinel_inside_track() {
        let read = MsrRead::parse(b"1&A?2;1;2?3;5?").unwrap();
        let MsrRead::Error(set) = read else {
            panic!("expected error");
        };
        assert_eq!(set.status[1], TrackStatus::StartSentinel);
        assert!(set.tracks[1].is_empty());
        assert_eq!(set.extended_error(), Some(1 << 8));
    }

    #[test]
    fn test_trailing_garbage_is_error() {
        let read = MsrRead::parse(b"1&A?X").unwrap();
        assert!(matches!(read, MsrRead::Error(_)));
    }

    #[test]
    fn test_pack() {
        assert_eq!(pack([5, 6, 7]), 0x07_06_05);
    }

    #[test]
    fn test_format_track() {
        assert_eq!(format_track(1, b";12?", false, true), b"12".to_vec());
        assert_eq!(format_track(1, b";12?", true, true), b";12?".to_vec());
        assert_eq!(format_track(1, b";12?", false, false), vec![1, 2]);
        assert_eq!(format_track(0, b"&AB?", false, false), vec![0x21, 0x22]);
        // Characters outside the card alphabet stay untouched.
        assert_eq!(format_track(1, b";1A?", false, false), b"1A".to_vec());
    }
}
