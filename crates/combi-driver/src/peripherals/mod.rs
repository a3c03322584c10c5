//! Application-facing peripheral handles.
//!
//! Every handle wraps a [`Session`] on a shared [`Driver`] and follows the
//! same lifecycle:
//!
//! ```text
//! new ──open──► opened ──claim──► claimed ──enable──► enabled
//!      ◄─close──        ◄─release─          ◄─disable─
//! ```
//!
//! Opening a handle opens the driver (starting the poller for the first
//! user). Claiming registers the handle as the exclusive receiver of its
//! sub-device's events. Commands need the handle enabled and the device
//! online; violations are rejected before anything is queued.

use std::sync::Arc;

use combi_core::{LockPosition, PeripheralKind, PowerState, constants::*};

use crate::driver::Driver;
use crate::error::{DriverError, Result};
use crate::events::{EventKind, EventReceiver, PeripheralEvent};

pub mod cash_drawer;
pub mod keyboard;
pub mod keylock;
pub mod line_display;
pub mod msr;
pub mod scanner;
pub mod tone_indicator;

pub use cash_drawer::CashDrawer;
pub use keyboard::{KeyboardEvent, PosKeyboard};
pub use keylock::{KeyWait, Keylock};
pub use line_display::{DisplayAttribute, DisplayContents, LineDisplay, ScrollDirection};
pub use msr::{Msr, MsrData, MsrError, MsrEvent, MsrOptions};
pub use scanner::{Scanner, ScannerEvent};
pub use tone_indicator::{Repeat, Tone, ToneIndicator};

/// What a sub-device supports, fixed when the handle is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Power state changes are reported.
    pub power_reporting: bool,

    /// The sub-device reports state changes (drawer, lock, key).
    pub status_reporting: bool,

    /// Display rows and columns.
    pub display: Option<(usize, usize)>,

    /// Selectable display character sets.
    pub character_sets: &'static [u32],

    /// Number of readable MSR tracks.
    pub tracks: usize,

    /// Number of keylock positions.
    pub key_positions: usize,
}

impl Capabilities {
    pub fn for_kind(kind: PeripheralKind) -> Self {
        let none = Self {
            power_reporting: true,
            status_reporting: false,
            display: None,
            character_sets: &[],
            tracks: 0,
            key_positions: 0,
        };
        match kind {
            PeripheralKind::CashDrawer => Self {
                status_reporting: true,
                ..none
            },
            PeripheralKind::Keylock => Self {
                status_reporting: true,
                key_positions: LockPosition::key_positions(),
                ..none
            },
            PeripheralKind::ElectronicKey => Self {
                status_reporting: true,
                ..none
            },
            PeripheralKind::LineDisplay => Self {
                display: Some((DISPLAY_ROWS, DISPLAY_COLUMNS)),
                character_sets: &DISPLAY_CHARACTER_SETS,
                ..none
            },
            PeripheralKind::Msr => Self { tracks: 3, ..none },
            PeripheralKind::Keyboard
            | PeripheralKind::Scanner
            | PeripheralKind::ToneIndicator => none,
        }
    }
}

/// Lifecycle state of one handle.
#[derive(Debug)]
pub struct Session {
    driver: Arc<Driver>,
    kind: PeripheralKind,
    capabilities: Capabilities,
    opened: bool,

    /// Event channel, present while claimed.
    events: Option<EventReceiver>,
    enabled: bool,
}

impl Session {
    pub fn new(driver: Arc<Driver>, kind: PeripheralKind) -> Self {
        Self {
            driver,
            kind,
            capabilities: Capabilities::for_kind(kind),
            opened: false,
            events: None,
            enabled: false,
        }
    }

    pub fn driver(&self) -> &Arc<Driver> {
        &self.driver
    }

    pub fn kind(&self) -> PeripheralKind {
        self.kind
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn is_open(&self) -> bool {
        self.opened
    }

    pub fn is_claimed(&self) -> bool {
        self.events.is_some()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// # Errors
    ///
    /// Fails if already open.
    pub async fn open(&mut self) -> Result<()> {
        if self.opened {
            return Err(DriverError::illegal(format!("{} already open", self.kind)));
        }
        self.driver.open().await?;
        self.opened = true;
        Ok(())
    }

    /// Disable, release and close.
    ///
    /// # Errors
    ///
    /// Fails if not open.
    pub async fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.is_claimed() {
            self.release()?;
        }
        self.opened = false;
        self.driver.close().await
    }

    /// # Errors
    ///
    /// [`DriverError::Claimed`] if another handle owns the sub-device.
    pub fn claim(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.is_claimed() {
            return Ok(());
        }
        self.events = Some(self.driver.router().claim(self.kind)?);
        Ok(())
    }

    /// # Errors
    ///
    /// [`DriverError::NotClaimed`] if not claimed.
    pub fn release(&mut self) -> Result<()> {
        self.ensure_claimed()?;
        self.enabled = false;
        self.events = None;
        self.driver.router().release(self.kind);
        Ok(())
    }

    /// # Errors
    ///
    /// [`DriverError::NotClaimed`] if not claimed.
    pub fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        self.ensure_claimed()?;
        self.enabled = enabled;
        Ok(())
    }

    pub fn ensure_open(&self) -> Result<()> {
        if self.opened {
            Ok(())
        } else {
            Err(DriverError::illegal(format!("{} not open", self.kind)))
        }
    }

    pub fn ensure_claimed(&self) -> Result<()> {
        self.ensure_open()?;
        if self.is_claimed() {
            Ok(())
        } else {
            Err(DriverError::NotClaimed(self.kind))
        }
    }

    /// Check that commands may be issued now.
    ///
    /// # Errors
    ///
    /// Lifecycle errors first, then the driver's availability error.
    pub fn ensure_enabled(&self) -> Result<()> {
        self.ensure_claimed()?;
        if !self.enabled {
            return Err(DriverError::illegal(format!("{} not enabled", self.kind)));
        }
        self.driver.ensure_online()
    }

    /// Next event for this sub-device.
    ///
    /// Data and error events arriving while disabled are dropped. Returns
    /// `None` when not claimed.
    pub async fn next_event(&mut self) -> Option<PeripheralEvent> {
        loop {
            let event = self.events.as_mut()?.recv().await?;
            if self.accepts(&event) {
                return Some(event);
            }
        }
    }

    /// Like [`Session::next_event`] but returns `None` instead of waiting.
    pub fn try_next_event(&mut self) -> Option<PeripheralEvent> {
        loop {
            let event = self.events.as_mut()?.try_recv().ok()?;
            if self.accepts(&event) {
                return Some(event);
            }
        }
    }

    fn accepts(&self, event: &PeripheralEvent) -> bool {
        self.enabled || matches!(event.kind, EventKind::Status(_))
    }

    pub fn power_state(&self) -> PowerState {
        self.driver.power_state()
    }

    /// # Errors
    ///
    /// Fails if not open.
    pub fn check_health(&self) -> Result<String> {
        self.ensure_open()?;
        Ok(self.driver.check_health())
    }
}

/// Lifecycle operations shared by every handle.
pub trait Peripheral {
    fn session(&self) -> &Session;

    fn session_mut(&mut self) -> &mut Session;

    async fn open(&mut self) -> Result<()> {
        self.session_mut().open().await
    }

    async fn close(&mut self) -> Result<()> {
        self.session_mut().close().await
    }

    async fn claim(&mut self) -> Result<()> {
        self.session_mut().claim()
    }

    async fn release(&mut self) -> Result<()> {
        self.session_mut().release()
    }

    async fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        self.session_mut().set_enabled(enabled)
    }

    fn check_health(&self) -> Result<String> {
        self.session().check_health()
    }

    fn power_state(&self) -> PowerState {
        self.session().power_state()
    }

    fn capabilities(&self) -> &Capabilities {
        self.session().capabilities()
    }
}
