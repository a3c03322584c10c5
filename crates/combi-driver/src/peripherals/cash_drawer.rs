//! Cash drawer.

use std::sync::Arc;
use std::time::Duration;

use combi_core::{ConnectionState, PeripheralKind};
use combi_protocol::Command;
use tokio::sync::watch;
use tracing::debug;

use crate::driver::Driver;
use crate::error::{DriverError, Result};
use crate::events::PeripheralEvent;
use crate::mirror::DeviceSnapshot;
use crate::peripherals::{Peripheral, Session};

#[derive(Debug)]
pub struct CashDrawer {
    session: Session,
}

impl CashDrawer {
    pub fn new(driver: Arc<Driver>) -> Self {
        Self {
            session: Session::new(driver, PeripheralKind::CashDrawer),
        }
    }

    /// Drawer state as last reported by the device.
    ///
    /// # Errors
    ///
    /// Fails if not open.
    pub fn is_drawer_open(&self) -> Result<bool> {
        self.session.ensure_open()?;
        Ok(self.session.driver().snapshot().drawer_open)
    }

    /// Open the drawer.
    ///
    /// Each attempt sends the open command followed by a status request;
    /// the drawer counts as opened once the status request is answered.
    /// Up to `MaxRetry` attempts are made (at least one).
    ///
    /// # Errors
    ///
    /// [`DriverError::NoResponse`] if no attempt was confirmed, or the
    /// availability error if the device goes away meanwhile.
    pub async fn open_drawer(&self) -> Result<()> {
        self.session.ensure_enabled()?;
        let driver = self.session.driver();
        let attempts = driver.config().max_retry.max(1);
        for attempt in 1..=attempts {
            driver.execute(Command::DrawerOpen).await?;
            match driver.execute(Command::StatusRequest).await {
                Ok(()) => return Ok(()),
                Err(DriverError::NoResponse(_)) => {
                    debug!(attempt, "Drawer open not confirmed");
                }
                Err(e) => return Err(e),
            }
        }
        Err(DriverError::no_response("No response on drawer open request"))
    }

    /// Wait until the drawer is closed, beeping while it stays open.
    ///
    /// After `beep_timeout` without the drawer closing, the beeper is
    /// switched on for `beep_duration` and off for `beep_delay`, repeatedly.
    /// The beeper is always left off. The wait also ends when the device
    /// leaves the online state.
    ///
    /// # Errors
    ///
    /// Lifecycle errors, or the availability error if the device went away
    /// while the drawer was still open.
    pub async fn wait_for_drawer_close(
        &self,
        beep_timeout: Duration,
        beep_duration: Duration,
        beep_delay: Duration,
    ) -> Result<()> {
        self.session.ensure_enabled()?;
        let driver = self.session.driver();
        let mut device = driver.subscribe_device();
        let mut state = driver.subscribe_state();

        let mut beeping = false;
        let mut wait = beep_timeout;
        let mut result = Ok(());
        while !wait_closed(&mut device, &mut state, wait).await {
            let (command, next) = if beeping {
                (Command::BeepOff, beep_delay)
            } else {
                (Command::BeepOn, beep_duration)
            };
            if let Err(e) = driver.execute(command).await {
                result = Err(e);
                break;
            }
            beeping = !beeping;
            wait = next;
        }
        if beeping && driver.connection_state().is_online() {
            driver.execute(Command::BeepOff).await?;
        }
        result?;

        if driver.snapshot().drawer_open {
            driver.ensure_online()?;
        }
        Ok(())
    }

    pub async fn next_event(&mut self) -> Option<PeripheralEvent> {
        self.session.next_event().await
    }

    pub fn try_next_event(&mut self) -> Option<PeripheralEvent> {
        self.session.try_next_event()
    }
}

/// Wait up to `timeout` for the drawer to close or the device to leave the
/// online state. Returns `false` on timeout.
async fn wait_closed(
    device: &mut watch::Receiver<DeviceSnapshot>,
    state: &mut watch::Receiver<ConnectionState>,
    timeout: Duration,
) -> bool {
    let condition = async {
        loop {
            if !device.borrow_and_update().drawer_open || !state.borrow_and_update().is_online() {
                return;
            }
            tokio::select! {
                changed = device.changed() => if changed.is_err() { return },
                changed = state.changed() => if changed.is_err() { return },
            }
        }
    };
    tokio::time::timeout(timeout, condition).await.is_ok()
}

impl Peripheral for CashDrawer {
    fn session(&self) -> &Session {
        &self.session
    }

    fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}
