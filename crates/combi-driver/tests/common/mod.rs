//! Shared helpers for driver integration tests.
//!
//! Every test runs on a paused clock against the simulated device, so
//! request timeouts and poll delays elapse instantly.

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use combi_core::ConnectionState;
use combi_driver::{Driver, DriverConfig};
use combi_transport::{MockTransport, MockTransportHandle};

/// Upper bound for anything a test waits on.
pub const PATIENCE: Duration = Duration::from_secs(30);

pub fn mock_driver() -> (Arc<Driver>, MockTransportHandle) {
    mock_driver_with(DriverConfig::new("mock"))
}

pub fn mock_driver_with(config: DriverConfig) -> (Arc<Driver>, MockTransportHandle) {
    let (transport, handle) = MockTransport::new();
    (Arc::new(Driver::with_transport(config, transport)), handle)
}

/// Wait until the driver reaches `state`.
pub async fn wait_for_state(driver: &Driver, state: ConnectionState) {
    let mut rx = driver.subscribe_state();
    tokio::time::timeout(PATIENCE, rx.wait_for(|s| *s == state))
        .await
        .unwrap_or_else(|_| panic!("driver never reached {}", state))
        .unwrap();
}

/// Await `future`, failing the test if it does not finish in time.
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(PATIENCE, future)
        .await
        .expect("timed out")
}

/// Let the poller run a few cycles.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(500)).await;
}
