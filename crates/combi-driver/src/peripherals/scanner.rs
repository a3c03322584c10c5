//! Barcode scanner.
//!
//! The device only reports labels while scanning is switched on with `RE`.
//! The handle switches it on while it is claimed with data events enabled,
//! and off again on release or when data events are disabled.

use std::sync::Arc;

use combi_core::{LabelType, PeripheralKind};
use combi_protocol::Command;
use tracing::debug;

use crate::driver::Driver;
use crate::error::Result;
use crate::events::{DataEvent, EventKind, PeripheralEvent, StatusUpdate};
use crate::peripherals::{Peripheral, Session};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScannerEvent {
    Label {
        /// Everything the device sent after the tag.
        data: Vec<u8>,
        /// Label digits, empty unless decoding is on.
        label: Vec<u8>,
        label_type: LabelType,
    },
    Status(StatusUpdate),
}

#[derive(Debug)]
pub struct Scanner {
    session: Session,
    data_event_enabled: bool,
    decode_data: bool,
}

impl Scanner {
    pub fn new(driver: Arc<Driver>) -> Self {
        Self {
            session: Session::new(driver, PeripheralKind::Scanner),
            data_event_enabled: false,
            decode_data: true,
        }
    }

    pub fn data_event_enabled(&self) -> bool {
        self.data_event_enabled
    }

    /// Switch label delivery on or off. While claimed, a change is sent to
    /// the device.
    ///
    /// # Errors
    ///
    /// Fails if the change must be sent but the device is not online.
    pub fn set_data_event_enabled(&mut self, enabled: bool) -> Result<()> {
        if enabled != self.data_event_enabled && self.session.is_claimed() {
            self.session.driver().post(scan_command(enabled))?;
        }
        self.data_event_enabled = enabled;
        Ok(())
    }

    pub fn decode_data(&self) -> bool {
        self.decode_data
    }

    pub fn set_decode_data(&mut self, decode_data: bool) {
        self.decode_data = decode_data;
    }

    /// Next label or status change, `None` when not claimed.
    pub async fn next_event(&mut self) -> Option<ScannerEvent> {
        loop {
            let event = self.session.next_event().await?;
            if let Some(event) = self.convert(event) {
                return Some(event);
            }
        }
    }

    pub fn try_next_event(&mut self) -> Option<ScannerEvent> {
        loop {
            let event = self.session.try_next_event()?;
            if let Some(event) = self.convert(event) {
                return Some(event);
            }
        }
    }

    fn convert(&self, event: PeripheralEvent) -> Option<ScannerEvent> {
        match event.kind {
            EventKind::Data(DataEvent::Label(scan)) => {
                let (label, label_type) = if self.decode_data {
                    (scan.label, scan.label_type)
                } else {
                    (Vec::new(), LabelType::Unknown)
                };
                Some(ScannerEvent::Label {
                    data: scan.data,
                    label,
                    label_type,
                })
            }
            EventKind::Status(update) => Some(ScannerEvent::Status(update)),
            _ => None,
        }
    }

    /// Send the scan state for the current setting if the device can take
    /// it. A device that is not online gets the state on the next change.
    fn sync_scanning(&self, enabled: bool) {
        let driver = self.session.driver();
        if let Err(e) = driver.post(scan_command(enabled)) {
            debug!(error = %e, "Scanner state not sent");
        }
    }
}

fn scan_command(enabled: bool) -> Command {
    if enabled {
        Command::ScannerEnable
    } else {
        Command::ScannerDisable
    }
}

impl Peripheral for Scanner {
    fn session(&self) -> &Session {
        &self.session
    }

    fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    async fn claim(&mut self) -> Result<()> {
        if self.session.is_claimed() {
            return Ok(());
        }
        self.session.claim()?;
        if self.data_event_enabled {
            self.sync_scanning(true);
        }
        Ok(())
    }

    async fn release(&mut self) -> Result<()> {
        self.session.ensure_claimed()?;
        if self.data_event_enabled {
            self.sync_scanning(false);
        }
        self.session.release()
    }

    async fn close(&mut self) -> Result<()> {
        if self.session.is_claimed() {
            Peripheral::release(self).await?;
        }
        self.session.close().await
    }
}
