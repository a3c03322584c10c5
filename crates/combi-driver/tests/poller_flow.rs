//! Poller behavior against the simulated device: retries, offline
//! detection, command ordering and aborts.

mod common;

use std::time::Duration;

use combi_core::{ConnectionState, PowerState, TrackStatus};
use combi_driver::peripherals::MsrEvent;
use combi_driver::{
    CashDrawer, DriverConfig, DriverError, EventKind, Keylock, Msr, Peripheral, StatusUpdate,
};
use combi_protocol::Command;
use common::{mock_driver, mock_driver_with, settle, wait_for_state, within};
use rstest::rstest;
use tokio::time::Instant;

fn power_events(drawer: &mut CashDrawer) -> Vec<PowerState> {
    std::iter::from_fn(|| drawer.try_next_event())
        .filter_map(|e| match e.kind {
            EventKind::Status(StatusUpdate::Power(p)) => Some(p),
            _ => None,
        })
        .collect()
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(4)]
#[tokio::test(start_paused = true)]
async fn test_offline_after_max_retry_timeouts(#[case] max_retry: u32) {
    let config = DriverConfig {
        max_retry,
        ..DriverConfig::new("mock")
    };
    let request_timeout = config.request_timeout();
    let (driver, handle) = mock_driver_with(config);
    handle.set_responsive(false);

    let started = Instant::now();
    let mut drawer = CashDrawer::new(driver.clone());
    drawer.open().await.unwrap();
    drawer.claim().await.unwrap();
    wait_for_state(&driver, ConnectionState::Offline).await;

    // MaxRetry silent cycles are tolerated, the next one goes offline.
    let elapsed = started.elapsed();
    let tolerated = request_timeout * (max_retry + 1);
    assert!(elapsed >= tolerated, "offline after {:?}", elapsed);
    assert!(elapsed < tolerated + request_timeout, "offline after {:?}", elapsed);

    // Polling goes on while offline without further offline events.
    let polls = handle.count_written(b"SR");
    tokio::time::sleep(request_timeout * 10).await;
    assert!(handle.count_written(b"SR") > polls);
    assert_eq!(power_events(&mut drawer), vec![PowerState::Offline]);
    assert_eq!(driver.connection_state(), ConnectionState::Offline);

    drawer.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_recovers_from_offline() {
    let (driver, handle) = mock_driver();
    let mut drawer = CashDrawer::new(driver.clone());
    drawer.open().await.unwrap();
    drawer.claim().await.unwrap();

    handle.set_responsive(false);
    wait_for_state(&driver, ConnectionState::Offline).await;
    assert_eq!(drawer.power_state(), PowerState::Offline);

    handle.set_responsive(true);
    wait_for_state(&driver, ConnectionState::Online).await;
    assert_eq!(
        power_events(&mut drawer),
        vec![PowerState::Offline, PowerState::Online]
    );
    drawer.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_offline_fails_fast_without_writing() {
    let (driver, handle) = mock_driver();
    let mut drawer = CashDrawer::new(driver.clone());
    drawer.open().await.unwrap();
    drawer.claim().await.unwrap();
    drawer.set_enabled(true).await.unwrap();

    handle.set_responsive(false);
    wait_for_state(&driver, ConnectionState::Offline).await;

    assert!(matches!(
        drawer.open_drawer().await,
        Err(DriverError::Offline)
    ));
    assert!(matches!(
        driver.execute(Command::BeepOn).await,
        Err(DriverError::Offline)
    ));
    settle().await;
    assert_eq!(handle.count_written(b"DO"), 0);
    assert_eq!(handle.count_written(b"B1"), 0);
    assert!(!handle.is_drawer_open());
    drawer.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_posted_command_does_not_block_polling() {
    let (driver, handle) = mock_driver();
    driver.open().await.unwrap();

    driver.post(Command::BeepOn).unwrap();
    settle().await;
    assert_eq!(handle.count_written(b"B1"), 1);

    let polls = handle.count_written(b"SR");
    settle().await;
    assert!(handle.count_written(b"SR") > polls);
    assert_eq!(handle.count_written(b"B1"), 1);
    driver.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_commands_resolve_in_order() {
    let (driver, handle) = mock_driver();
    driver.open().await.unwrap();
    handle.clear_written();

    let (a, b, c, d) = within(async {
        tokio::join!(
            driver.execute(Command::code_page(437).unwrap()),
            driver.execute(Command::BeepOn),
            driver.execute(Command::code_page(1252).unwrap()),
            driver.execute(Command::BeepOff),
        )
    })
    .await;
    a.unwrap();
    b.unwrap();
    c.unwrap();
    d.unwrap();

    assert_eq!(
        handle.commands(),
        vec![
            b"C0".to_vec(),
            b"B1".to_vec(),
            b"C3".to_vec(),
            b"B0".to_vec()
        ]
    );
    driver.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_pending_commands_abort_on_io_failure() {
    let (driver, handle) = mock_driver();
    let mut drawer = CashDrawer::new(driver.clone());
    drawer.open().await.unwrap();
    drawer.claim().await.unwrap();

    handle.fail_next_io();
    let result = within(driver.execute(Command::code_page(997).unwrap())).await;
    assert!(matches!(result, Err(DriverError::NoResponse(_))));

    wait_for_state(&driver, ConnectionState::Online).await;
    assert_eq!(handle.open_attempts(), 2);
    assert_eq!(
        power_events(&mut drawer),
        vec![PowerState::Off, PowerState::Online]
    );
    drawer.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_pending_commands_abort_on_offline() {
    let (driver, handle) = mock_driver();
    driver.open().await.unwrap();

    handle.set_responsive(false);
    let result = within(driver.execute(Command::code_page(998).unwrap())).await;
    assert!(matches!(result, Err(DriverError::NoResponse(_))));
    wait_for_state(&driver, ConnectionState::Offline).await;
    driver.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_reopen_retried_until_device_answers() {
    let (driver, handle) = mock_driver();
    handle.fail_opens(3);
    driver.open().await.unwrap();
    wait_for_state(&driver, ConnectionState::Online).await;
    assert_eq!(handle.open_attempts(), 4);
    driver.close().await.unwrap();
    assert_eq!(driver.connection_state(), ConnectionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_status_frame_opens_drawer_for_owner_only() {
    let (driver, handle) = mock_driver();
    let mut drawer = CashDrawer::new(driver.clone());
    let mut keylock = Keylock::new(driver.clone());
    drawer.open().await.unwrap();
    drawer.claim().await.unwrap();
    keylock.open().await.unwrap();
    keylock.claim().await.unwrap();

    handle.set_drawer_open(true);
    handle.inject(b"SO-000000000000");
    let event = within(drawer.next_event()).await.unwrap();
    assert_eq!(event.kind, EventKind::Status(StatusUpdate::DrawerOpened));
    assert!(drawer.is_drawer_open().unwrap());

    settle().await;
    assert!(keylock.try_next_event().is_none());
    keylock.close().await.unwrap();
    drawer.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_status_raises_one_event() {
    let (driver, handle) = mock_driver();
    let mut drawer = CashDrawer::new(driver.clone());
    drawer.open().await.unwrap();
    drawer.claim().await.unwrap();

    handle.set_drawer_open(true);
    settle().await;
    settle().await;
    handle.inject(b"SO-000000000000");
    settle().await;

    let events: Vec<_> = std::iter::from_fn(|| drawer.try_next_event()).collect();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Status(StatusUpdate::DrawerOpened));
    drawer.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_bad_track_reported_as_error_event() {
    let (driver, handle) = mock_driver();
    let mut msr = Msr::new(driver.clone());
    msr.open().await.unwrap();
    msr.claim().await.unwrap();
    msr.set_enabled(true).await.unwrap();

    handle.inject(b"M0141&AB?2;12?3;45");
    let event = within(msr.next_event()).await.unwrap();
    let MsrEvent::Error(error) = event else {
        panic!("expected error event, got {:?}", event);
    };
    assert_eq!(
        error.status,
        [
            TrackStatus::Success,
            TrackStatus::Success,
            TrackStatus::EndSentinel
        ]
    );
    assert_eq!(error.tracks[0], b"AB".to_vec());
    assert_eq!(error.extended, None);

    // The connection survives the bad card.
    settle().await;
    assert_eq!(driver.connection_state(), ConnectionState::Online);

    handle.inject(b"M0161&AB?2;12?3;456?");
    let MsrEvent::Data(data) = within(msr.next_event()).await.unwrap() else {
        panic!("expected data event");
    };
    assert_eq!(data.tracks[2], b"456".to_vec());
    assert_eq!(data.data_status, (5 << 16) | (4 << 8) | 4);
    msr.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_garbage_discarded_without_going_offline() {
    let (driver, handle) = mock_driver();
    driver.open().await.unwrap();
    handle.inject(b"QQQ");
    settle().await;
    assert_eq!(driver.connection_state(), ConnectionState::Online);
    assert!(handle.count_written(b"SR") > 1);
    driver.close().await.unwrap();

    // Shut down within one request cycle.
    let started = Instant::now();
    driver.open().await.unwrap();
    driver.close().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
}
