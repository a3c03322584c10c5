//! Drivers shared by connection target.
//!
//! Peripherals configured with the same `ComPort` must share one driver,
//! since the device multiplexes all of them on one link. The registry hands
//! out the same [`Driver`] for a target until its last user releases it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::config::DriverConfig;
use crate::driver::Driver;
use crate::error::Result;

#[derive(Debug)]
struct Entry {
    driver: Arc<Driver>,
    users: usize,
}

#[derive(Debug, Default)]
pub struct DriverRegistry {
    drivers: Mutex<HashMap<String, Entry>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.drivers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Get the driver for `config.com_port`, creating it on first use.
    ///
    /// The configuration only matters for the first acquirer.
    ///
    /// # Errors
    ///
    /// Fails if a new driver cannot be created from `config`.
    pub fn acquire(&self, config: &DriverConfig) -> Result<Arc<Driver>> {
        let mut drivers = self.lock();
        if let Some(entry) = drivers.get_mut(&config.com_port) {
            entry.users += 1;
            return Ok(entry.driver.clone());
        }
        let driver = Arc::new(Driver::new(config.clone())?);
        self.insert(&mut drivers, driver.clone());
        Ok(driver)
    }

    /// Register an existing driver under its target, or share the one
    /// already registered there.
    pub fn acquire_with(&self, driver: Driver) -> Arc<Driver> {
        let mut drivers = self.lock();
        if let Some(entry) = drivers.get_mut(driver.target()) {
            entry.users += 1;
            return entry.driver.clone();
        }
        let driver = Arc::new(driver);
        self.insert(&mut drivers, driver.clone());
        driver
    }

    fn insert(&self, drivers: &mut HashMap<String, Entry>, driver: Arc<Driver>) {
        debug!(port = %driver.target(), "Driver created");
        drivers.insert(
            driver.target().to_string(),
            Entry {
                driver,
                users: 1,
            },
        );
    }

    /// Drop one use of the driver for `target`. The driver leaves the
    /// registry with its last user.
    pub fn release(&self, target: &str) {
        let mut drivers = self.lock();
        let Some(entry) = drivers.get_mut(target) else {
            return;
        };
        entry.users -= 1;
        if entry.users == 0 {
            drivers.remove(target);
            debug!(port = %target, "Driver removed");
        }
    }

    pub fn contains(&self, target: &str) -> bool {
        self.lock().contains_key(target)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
