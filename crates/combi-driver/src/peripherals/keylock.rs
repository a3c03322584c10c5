//! Keylocks.
//!
//! The device has two: index 0 is the positional lock, index 1 the
//! electronic key reader. Both are read from the device mirror.

use std::sync::Arc;
use std::time::Duration;

use combi_core::{LockPosition, PeripheralKind};
use tokio::sync::watch;

use crate::driver::Driver;
use crate::error::{DriverError, Result};
use crate::events::PeripheralEvent;
use crate::mirror::DeviceSnapshot;
use crate::peripherals::{Peripheral, Session};

/// Condition for [`Keylock::wait_for_keylock_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyWait {
    /// Any change of the lock position or key value.
    Any,
    /// The positional lock reaching this position.
    Position(LockPosition),
}

#[derive(Debug)]
pub struct Keylock {
    session: Session,
}

impl Keylock {
    /// The positional lock.
    pub fn new(driver: Arc<Driver>) -> Self {
        Self {
            session: Session::new(driver, PeripheralKind::Keylock),
        }
    }

    /// The electronic key reader.
    pub fn electronic(driver: Arc<Driver>) -> Self {
        Self {
            session: Session::new(driver, PeripheralKind::ElectronicKey),
        }
    }

    pub fn is_electronic(&self) -> bool {
        self.session.kind() == PeripheralKind::ElectronicKey
    }

    /// # Errors
    ///
    /// Fails if not open.
    pub fn key_position(&self) -> Result<LockPosition> {
        self.session.ensure_open()?;
        Ok(self.session.driver().snapshot().lock)
    }

    /// Current key value, raw bytes or hex text depending on `BinaryEKey`.
    /// Empty before the first report.
    ///
    /// # Errors
    ///
    /// Fails if not open.
    pub fn electronic_key(&self) -> Result<Vec<u8>> {
        self.session.ensure_open()?;
        Ok(self.session.driver().snapshot().electronic_key)
    }

    /// Wait for a keylock change.
    ///
    /// Returns immediately if the lock already is in the requested
    /// position. `None` waits forever. Returns the lock position at the
    /// time the wait ended.
    ///
    /// # Errors
    ///
    /// * [`DriverError::Timeout`] ("No keylock change") when `timeout`
    ///   elapses first
    /// * [`DriverError::InvalidArgument`] when waiting for a position on the
    ///   electronic key reader
    pub async fn wait_for_keylock_change(
        &self,
        wait: KeyWait,
        timeout: Option<Duration>,
    ) -> Result<LockPosition> {
        self.session.ensure_enabled()?;
        if self.is_electronic() && wait != KeyWait::Any {
            return Err(DriverError::invalid_argument(
                "Electronic keylock has no positions",
            ));
        }

        let mut device = self.session.driver().subscribe_device();
        let start = device.borrow_and_update().clone();
        if let KeyWait::Position(target) = wait
            && start.lock == target
        {
            return Ok(target);
        }

        let electronic = self.is_electronic();
        let changed = wait_for(&mut device, |s| match wait {
            KeyWait::Position(target) => s.lock == target,
            KeyWait::Any if electronic => s.electronic_key != start.electronic_key,
            KeyWait::Any => s.lock != start.lock,
        });
        let snapshot = match timeout {
            Some(limit) => tokio::time::timeout(limit, changed)
                .await
                .map_err(|_| DriverError::timeout("No keylock change"))?,
            None => changed.await,
        }?;
        Ok(snapshot.lock)
    }

    pub async fn next_event(&mut self) -> Option<PeripheralEvent> {
        self.session.next_event().await
    }

    pub fn try_next_event(&mut self) -> Option<PeripheralEvent> {
        self.session.try_next_event()
    }
}

async fn wait_for(
    device: &mut watch::Receiver<DeviceSnapshot>,
    condition: impl Fn(&DeviceSnapshot) -> bool,
) -> Result<DeviceSnapshot> {
    let snapshot = device
        .wait_for(|s| condition(s))
        .await
        .map_err(|_| DriverError::Closed)?;
    Ok(snapshot.clone())
}

impl Peripheral for Keylock {
    fn session(&self) -> &Session {
        &self.session
    }

    fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}
