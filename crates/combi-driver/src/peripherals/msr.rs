//! Magnetic stripe reader.

use std::sync::Arc;

use combi_core::{PeripheralKind, TrackStatus};
use combi_protocol::{TrackSet, msr};
use serde::{Deserialize, Serialize};

use crate::driver::Driver;
use crate::events::{DataEvent, ErrorEvent, EventKind, PeripheralEvent, StatusUpdate};
use crate::peripherals::{Peripheral, Session};

/// Delivery options for swiped tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MsrOptions {
    /// Tracks to deliver, track 1 first. Unread tracks arrive empty.
    pub tracks_to_read: [bool; 3],

    /// Keep start and end sentinels.
    pub transmit_sentinels: bool,

    /// Deliver characters as printed rather than as raw card values.
    pub decode_data: bool,
}

impl Default for MsrOptions {
    fn default() -> Self {
        Self {
            tracks_to_read: [true; 3],
            transmit_sentinels: false,
            decode_data: true,
        }
    }
}

/// Tracks of a clean swipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsrData {
    pub tracks: [Vec<u8>; 3],

    /// Raw lengths of the tracks read, packed like the extended error code.
    /// Tracks not selected in `tracks_to_read` count as empty.
    pub data_status: u32,
}

/// A failed swipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsrError {
    /// Tracks read before the failure.
    pub tracks: [Vec<u8>; 3],
    pub status: [TrackStatus; 3],

    /// Packed per-track status, `None` if the payload could not be parsed
    /// to its end.
    pub extended: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MsrEvent {
    Data(MsrData),
    Error(MsrError),
    Status(StatusUpdate),
}

#[derive(Debug)]
pub struct Msr {
    session: Session,
    options: MsrOptions,
}

impl Msr {
    pub fn new(driver: Arc<Driver>) -> Self {
        Self::with_options(driver, MsrOptions::default())
    }

    pub fn with_options(driver: Arc<Driver>, options: MsrOptions) -> Self {
        Self {
            session: Session::new(driver, PeripheralKind::Msr),
            options,
        }
    }

    pub fn options(&self) -> &MsrOptions {
        &self.options
    }

    /// Change delivery options. Applies to swipes not yet delivered.
    pub fn set_options(&mut self, options: MsrOptions) {
        self.options = options;
    }

    /// Next swipe or status change, `None` when not claimed.
    pub async fn next_event(&mut self) -> Option<MsrEvent> {
        loop {
            let event = self.session.next_event().await?;
            if let Some(event) = self.convert(event) {
                return Some(event);
            }
        }
    }

    pub fn try_next_event(&mut self) -> Option<MsrEvent> {
        loop {
            let event = self.session.try_next_event()?;
            if let Some(event) = self.convert(event) {
                return Some(event);
            }
        }
    }

    fn convert(&self, event: PeripheralEvent) -> Option<MsrEvent> {
        match event.kind {
            EventKind::Status(update) => Some(MsrEvent::Status(update)),
            EventKind::Data(DataEvent::Tracks(set)) => Some(MsrEvent::Data(MsrData {
                data_status: msr::pack(std::array::from_fn(|track| {
                    if self.options.tracks_to_read[track] {
                        set.tracks[track].len() as u32
                    } else {
                        0
                    }
                })),
                tracks: self.format(&set),
            })),
            EventKind::Error(ErrorEvent::Tracks { tracks, extended }) => {
                Some(MsrEvent::Error(MsrError {
                    tracks: self.format(&tracks),
                    status: tracks.status,
                    extended,
                }))
            }
            _ => None,
        }
    }

    fn format(&self, set: &TrackSet) -> [Vec<u8>; 3] {
        std::array::from_fn(|track| {
            if self.options.tracks_to_read[track] {
                msr::format_track(
                    track,
                    &set.tracks[track],
                    self.options.transmit_sentinels,
                    self.options.decode_data,
                )
            } else {
                Vec::new()
            }
        })
    }
}

impl Peripheral for Msr {
    fn session(&self) -> &Session {
        &self.session
    }

    fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}
