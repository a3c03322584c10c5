//! Peripheral handles driving the simulated device end to end.

mod common;

use std::sync::Arc;
use std::time::Duration;

use combi_core::{ConnectionState, LockPosition};
use combi_driver::peripherals::{DisplayAttribute, KeyboardEvent};
use combi_driver::{
    CashDrawer, DriverConfig, DriverError, DriverRegistry, KeyTable, KeyWait, Keylock,
    LineDisplay, Peripheral, PosKeyboard,
};
use combi_transport::MockTransport;
use common::{mock_driver, mock_driver_with, settle, wait_for_state, within};

#[tokio::test(start_paused = true)]
async fn test_open_drawer_confirmed_by_status() {
    let (driver, handle) = mock_driver();
    let mut drawer = CashDrawer::new(driver);
    drawer.open().await.unwrap();
    drawer.claim().await.unwrap();
    drawer.set_enabled(true).await.unwrap();
    assert!(!drawer.is_drawer_open().unwrap());

    within(drawer.open_drawer()).await.unwrap();
    assert!(drawer.is_drawer_open().unwrap());
    assert_eq!(handle.count_written(b"DO"), 1);
    drawer.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_open_drawer_without_answer() {
    let (driver, handle) = mock_driver();
    let mut drawer = CashDrawer::new(driver.clone());
    drawer.open().await.unwrap();
    drawer.claim().await.unwrap();
    drawer.set_enabled(true).await.unwrap();

    // The unanswered status request takes the device offline, which ends
    // the retries.
    handle.set_responsive(false);
    let result = within(drawer.open_drawer()).await;
    assert!(matches!(result, Err(DriverError::Offline)), "{:?}", result);
    assert_eq!(handle.count_written(b"DO"), 1);
    assert_eq!(driver.connection_state(), ConnectionState::Offline);
    drawer.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_drawer_close_beeps_until_closed() {
    let (driver, handle) = mock_driver();
    let mut drawer = CashDrawer::new(driver);
    drawer.open().await.unwrap();
    drawer.claim().await.unwrap();
    drawer.set_enabled(true).await.unwrap();
    within(drawer.open_drawer()).await.unwrap();

    let device = handle.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        device.set_drawer_open(false);
    });

    within(drawer.wait_for_drawer_close(
        Duration::from_millis(200),
        Duration::from_millis(100),
        Duration::from_millis(100),
    ))
    .await
    .unwrap();
    assert!(!drawer.is_drawer_open().unwrap());

    let beeps: Vec<Vec<u8>> = handle
        .commands()
        .into_iter()
        .filter(|c| c.first() == Some(&b'B'))
        .collect();
    assert!(beeps.len() >= 2, "beeper never switched: {:?}", beeps);
    assert_eq!(beeps.first().unwrap(), b"B1");
    assert_eq!(beeps.last().unwrap(), b"B0");
    drawer.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_drawer_close_returns_when_closed() {
    let (driver, handle) = mock_driver();
    let mut drawer = CashDrawer::new(driver);
    drawer.open().await.unwrap();
    drawer.claim().await.unwrap();
    drawer.set_enabled(true).await.unwrap();

    within(drawer.wait_for_drawer_close(
        Duration::from_millis(200),
        Duration::from_millis(100),
        Duration::from_millis(100),
    ))
    .await
    .unwrap();
    assert_eq!(handle.count_written(b"B1"), 0);
    drawer.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_keylock_wait_for_position() {
    let (driver, handle) = mock_driver();
    let mut keylock = Keylock::new(driver);
    keylock.open().await.unwrap();
    keylock.claim().await.unwrap();
    keylock.set_enabled(true).await.unwrap();
    assert_eq!(keylock.key_position().unwrap(), LockPosition::Removed);

    let device = handle.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        device.set_lock(b'1');
    });
    let position = keylock
        .wait_for_keylock_change(
            KeyWait::Position(LockPosition::One),
            Some(Duration::from_secs(5)),
        )
        .await
        .unwrap();
    assert_eq!(position, LockPosition::One);

    // Already there.
    let position = keylock
        .wait_for_keylock_change(KeyWait::Position(LockPosition::One), Some(Duration::ZERO))
        .await
        .unwrap();
    assert_eq!(position, LockPosition::One);

    let result = keylock
        .wait_for_keylock_change(KeyWait::Any, Some(Duration::from_millis(200)))
        .await;
    assert!(
        matches!(result, Err(DriverError::Timeout(ref message)) if message == "No keylock change")
    );
    keylock.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_electronic_key_change() {
    let (driver, handle) = mock_driver();
    let mut ekey = Keylock::electronic(driver);
    ekey.open().await.unwrap();
    ekey.claim().await.unwrap();
    ekey.set_enabled(true).await.unwrap();
    assert_eq!(ekey.electronic_key().unwrap(), vec![0; 6]);

    assert!(matches!(
        ekey.wait_for_keylock_change(KeyWait::Position(LockPosition::X), None)
            .await,
        Err(DriverError::InvalidArgument(_))
    ));

    handle.set_electronic_key(b"0000000000AB");
    within(ekey.wait_for_keylock_change(KeyWait::Any, None))
        .await
        .unwrap();
    assert_eq!(ekey.electronic_key().unwrap(), vec![0, 0, 0, 0, 0, 0xAB]);
    ekey.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_keyboard_maps_keys() {
    let mut key_table = KeyTable::default();
    key_table.set(0, 0, 0x41);
    key_table.set(9, 15, 99);
    let config = DriverConfig {
        key_table,
        ..DriverConfig::new("mock")
    };
    let (driver, handle) = mock_driver_with(config);
    let mut keyboard = PosKeyboard::new(driver);
    keyboard.open().await.unwrap();
    keyboard.claim().await.unwrap();
    keyboard.set_enabled(true).await.unwrap();

    handle.inject(b"B0A");
    assert_eq!(
        within(keyboard.next_event()).await,
        Some(KeyboardEvent::KeyDown(0x41))
    );

    // Unmapped key, then a mapped one.
    handle.inject(b"B1C");
    handle.inject(b"B9P");
    assert_eq!(
        within(keyboard.next_event()).await,
        Some(KeyboardEvent::KeyDown(99))
    );
    keyboard.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_disabled_keyboard_drops_keys() {
    let mut key_table = KeyTable::default();
    key_table.set(0, 0, 1);
    let (driver, handle) = mock_driver_with(DriverConfig {
        key_table,
        ..DriverConfig::new("mock")
    });
    let mut keyboard = PosKeyboard::new(driver);
    keyboard.open().await.unwrap();
    keyboard.claim().await.unwrap();

    handle.inject(b"B0A");
    settle().await;
    assert_eq!(keyboard.try_next_event(), None);
    keyboard.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_registry_shares_connection() {
    let registry = DriverRegistry::new();
    let (transport, handle) = MockTransport::new();
    let driver = registry.acquire_with(combi_driver::Driver::with_transport(
        DriverConfig::new("mock"),
        transport,
    ));
    let (unused, _) = MockTransport::new();
    let same = registry.acquire_with(combi_driver::Driver::with_transport(
        DriverConfig::new("mock"),
        unused,
    ));
    assert!(Arc::ptr_eq(&driver, &same));

    let mut drawer = CashDrawer::new(driver.clone());
    let mut keylock = Keylock::new(same);
    drawer.open().await.unwrap();
    keylock.open().await.unwrap();
    assert_eq!(handle.open_attempts(), 1);
    assert_eq!(driver.open_count().await, 2);

    drawer.close().await.unwrap();
    assert_eq!(driver.connection_state(), ConnectionState::Online);
    keylock.close().await.unwrap();
    wait_for_state(&driver, ConnectionState::Closed).await;

    registry.release("mock");
    registry.release("mock");
    assert!(registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_display_contents_survive_handle_close() {
    let (driver, handle) = mock_driver();
    let mut first = LineDisplay::new(driver.clone());
    first.open().await.unwrap();
    first.claim().await.unwrap();
    first.set_enabled(true).await.unwrap();
    first
        .display_text("Total 12.50", DisplayAttribute::Normal)
        .await
        .unwrap();
    first.close().await.unwrap();
    wait_for_state(&driver, ConnectionState::Closed).await;

    handle.clear_written();
    let mut second = LineDisplay::new(driver);
    second.open().await.unwrap();
    second.claim().await.unwrap();
    second.set_enabled(true).await.unwrap();
    assert_eq!(second.row_text(0).unwrap().trim_end(), "Total 12.50");
    assert_eq!(second.cursor(), (0, 11));

    second
        .display_text_at(1, 0, "Thank you", DisplayAttribute::Reverse)
        .await
        .unwrap();
    let lines: Vec<String> = handle
        .commands()
        .into_iter()
        .filter(|c| c.first() == Some(&b'T'))
        .map(|c| String::from_utf8(c).unwrap())
        .collect();
    assert_eq!(
        lines,
        vec![
            format!("T040{:<20}{}", "Total 12.50", "n".repeat(20)),
            format!("T140{:<20}{}{}", "Thank you", "r".repeat(9), "n".repeat(11)),
        ]
    );
    second.close().await.unwrap();
}
