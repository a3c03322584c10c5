//! POS keyboard.
//!
//! Key positions are translated to key values with the configured
//! [`KeyTable`](crate::config::KeyTable) before they reach the handle; keys
//! mapped to 0 never produce an event.

use std::sync::Arc;

use combi_core::PeripheralKind;

use crate::driver::Driver;
use crate::events::{DataEvent, EventKind, PeripheralEvent, StatusUpdate};
use crate::peripherals::{Peripheral, Session};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyboardEvent {
    /// Key pressed, with its configured value.
    KeyDown(u32),
    Status(StatusUpdate),
}

#[derive(Debug)]
pub struct PosKeyboard {
    session: Session,
}

impl PosKeyboard {
    pub fn new(driver: Arc<Driver>) -> Self {
        Self {
            session: Session::new(driver, PeripheralKind::Keyboard),
        }
    }

    /// Next key press or status change, `None` when not claimed.
    pub async fn next_event(&mut self) -> Option<KeyboardEvent> {
        loop {
            if let Some(event) = convert(self.session.next_event().await?) {
                return Some(event);
            }
        }
    }

    pub fn try_next_event(&mut self) -> Option<KeyboardEvent> {
        loop {
            if let Some(event) = convert(self.session.try_next_event()?) {
                return Some(event);
            }
        }
    }
}

fn convert(event: PeripheralEvent) -> Option<KeyboardEvent> {
    match event.kind {
        EventKind::Data(DataEvent::Key { value }) => Some(KeyboardEvent::KeyDown(value)),
        EventKind::Status(update) => Some(KeyboardEvent::Status(update)),
        _ => None,
    }
}

impl Peripheral for PosKeyboard {
    fn session(&self) -> &Session {
        &self.session
    }

    fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}
