//! Last known device state.
//!
//! Only the poller writes the reported state. Every update method reports
//! whether the value changed so the poller raises status events on changes
//! only. Application handles read snapshots or await changes through a
//! [`watch::Receiver`].
//!
//! The display contents are written by the application instead and shared
//! by every line display handle of the connection.

use std::sync::{Mutex, MutexGuard};

use combi_core::LockPosition;
use serde::Serialize;
use tokio::sync::watch;

use crate::peripherals::line_display::DisplayContents;

/// State reported by the device, as last seen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceSnapshot {
    pub drawer_open: bool,
    pub lock: LockPosition,

    /// Electronic key in the configured representation (raw bytes or hex
    /// text). Empty until the first key report.
    pub electronic_key: Vec<u8>,

    /// Result of the last code page change.
    pub code_page_accepted: bool,
}

#[derive(Debug)]
pub struct DeviceMirror {
    tx: watch::Sender<DeviceSnapshot>,
    display: Mutex<DisplayContents>,
}

impl Default for DeviceMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceMirror {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(DeviceSnapshot::default());
        Self {
            tx,
            display: Mutex::new(DisplayContents::default()),
        }
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DeviceSnapshot> {
        self.tx.subscribe()
    }

    pub fn update_drawer(&self, open: bool) -> bool {
        self.tx.send_if_modified(|s| replace(&mut s.drawer_open, open))
    }

    pub fn update_lock(&self, position: LockPosition) -> bool {
        self.tx.send_if_modified(|s| replace(&mut s.lock, position))
    }

    pub fn update_electronic_key(&self, value: Vec<u8>) -> bool {
        self.tx
            .send_if_modified(|s| replace(&mut s.electronic_key, value))
    }

    pub fn set_code_page_accepted(&self, accepted: bool) {
        self.tx
            .send_if_modified(|s| replace(&mut s.code_page_accepted, accepted));
    }

    fn lock_display(&self) -> MutexGuard<'_, DisplayContents> {
        self.display.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Copy of the display contents.
    pub fn display(&self) -> DisplayContents {
        self.lock_display().clone()
    }

    pub fn edit_display<R>(&self, edit: impl FnOnce(&mut DisplayContents) -> R) -> R {
        edit(&mut *self.lock_display())
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}
