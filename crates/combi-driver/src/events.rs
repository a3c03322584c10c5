//! Event routing to claiming peripherals.
//!
//! Each sub-device has at most one owner: the handle that claimed it. The
//! router keeps one unbounded channel per owner and drops events for
//! unowned sub-devices. Power events go to every owner.
//!
//! ```text
//!            ┌──────────────┐      ┌─ CashDrawer owner
//!  poller ──►│ EventRouter  │──────┼─ Keylock owner
//!            │ (kind → tx)  │      ├─ MSR owner
//!            └──────────────┘      └─ ...
//! ```

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use combi_core::{LockPosition, PeripheralKind, PowerState};
use combi_protocol::{ScanData, TrackSet};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{DriverError, Result};

/// Event delivered to a peripheral owner.
#[derive(Debug, Clone)]
pub struct PeripheralEvent {
    pub peripheral: PeripheralKind,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum EventKind {
    Status(StatusUpdate),
    Data(DataEvent),
    Error(ErrorEvent),
}

/// State change of a sub-device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    Power(PowerState),
    DrawerOpened,
    DrawerClosed,
    KeyPosition(LockPosition),
    /// New electronic key value in the configured representation.
    ElectronicKey(Vec<u8>),
}

/// Input produced by a sub-device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataEvent {
    /// Key press with its configured key value.
    Key { value: u32 },
    Label(ScanData),
    /// Raw tracks of a clean swipe, sentinels included.
    Tracks(TrackSet),
}

/// Failed input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorEvent {
    /// Swipe with at least one bad track. `extended` carries the packed
    /// per-track status when the payload was parsed to its end.
    Tracks {
        tracks: TrackSet,
        extended: Option<u32>,
    },
}

/// Receiver given to the owner of a sub-device.
pub type EventReceiver = mpsc::UnboundedReceiver<PeripheralEvent>;

#[derive(Debug, Default)]
pub struct EventRouter {
    owners: Mutex<HashMap<PeripheralKind, mpsc::UnboundedSender<PeripheralEvent>>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PeripheralKind, mpsc::UnboundedSender<PeripheralEvent>>> {
        self.owners.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register the caller as exclusive owner of `kind`.
    ///
    /// An owner whose receiver was dropped no longer counts.
    ///
    /// # Errors
    ///
    /// [`DriverError::Claimed`] if another live owner exists.
    pub fn claim(&self, kind: PeripheralKind) -> Result<EventReceiver> {
        let mut owners = self.lock();
        if let Some(tx) = owners.get(&kind)
            && !tx.is_closed()
        {
            return Err(DriverError::Claimed(kind));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        owners.insert(kind, tx);
        debug!(peripheral = %kind, "Claimed");
        Ok(rx)
    }

    pub fn release(&self, kind: PeripheralKind) {
        if self.lock().remove(&kind).is_some() {
            debug!(peripheral = %kind, "Released");
        }
    }

    pub fn is_claimed(&self, kind: PeripheralKind) -> bool {
        self.lock().get(&kind).is_some_and(|tx| !tx.is_closed())
    }

    /// Deliver an event to the owner of `kind`. Returns whether an owner
    /// received it.
    pub fn emit(&self, kind: PeripheralKind, event: EventKind) -> bool {
        let mut owners = self.lock();
        let Some(tx) = owners.get(&kind) else {
            return false;
        };
        let event = PeripheralEvent {
            peripheral: kind,
            timestamp: Utc::now(),
            kind: event,
        };
        if tx.send(event).is_err() {
            owners.remove(&kind);
            return false;
        }
        true
    }

    /// Deliver a power state change to every owner.
    pub fn broadcast_power(&self, state: PowerState) {
        let timestamp = Utc::now();
        self.lock().retain(|&kind, tx| {
            tx.send(PeripheralEvent {
                peripheral: kind,
                timestamp,
                kind: EventKind::Status(StatusUpdate::Power(state)),
            })
            .is_ok()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_is_exclusive() {
        let router = EventRouter::new();
        let _rx = router.claim(PeripheralKind::CashDrawer).unwrap();
        assert!(matches!(
            router.claim(PeripheralKind::CashDrawer),
            Err(DriverError::Claimed(PeripheralKind::CashDrawer))
        ));
        router.release(PeripheralKind::CashDrawer);
        assert!(router.claim(PeripheralKind::CashDrawer).is_ok());
    }

    #[test]
    fn test_dropped_owner_can_be_replaced() {
        let router = EventRouter::new();
        drop(router.claim(PeripheralKind::Msr).unwrap());
        assert!(!router.is_claimed(PeripheralKind::Msr));
        assert!(router.claim(PeripheralKind::Msr).is_ok());
    }

    #[test]
    fn test_emit_only_to_owner() {
        let router = EventRouter::new();
        assert!(!router.emit(
            PeripheralKind::CashDrawer,
            EventKind::Status(StatusUpdate::DrawerOpened)
        ));

        let mut rx = router.claim(PeripheralKind::CashDrawer).unwrap();
        assert!(router.emit(
            PeripheralKind::CashDrawer,
            EventKind::Status(StatusUpdate::DrawerOpened)
        ));
        let event = rx.try_recv().unwrap();
        assert_eq!(event.peripheral, PeripheralKind::CashDrawer);
        assert_eq!(event.kind, EventKind::Status(StatusUpdate::DrawerOpened));
    }

    #[test]
    fn test_power_goes_to_every_owner() {
        let router = EventRouter::new();
        let mut drawer = router.claim(PeripheralKind::CashDrawer).unwrap();
        let mut scanner = router.claim(PeripheralKind::Scanner).unwrap();
        router.broadcast_power(PowerState::Offline);

        for rx in [&mut drawer, &mut scanner] {
            let event = rx.try_recv().unwrap();
            assert_eq!(
                event.kind,
                EventKind::Status(StatusUpdate::Power(PowerState::Offline))
            );
        }
    }
}
