//! Simulated combi device for testing and development.
//!
//! [`MockTransport`] behaves like the real device simulator on the other end
//! of a serial line: it answers status requests with a status frame built
//! from its current drawer, lock and electronic key state, opens the drawer
//! on `DO`, and acknowledges code page changes. Tests drive it through a
//! [`MockTransportHandle`], which can inject unsolicited frames, silence the
//! device, or make the next operation fail.
//!
//! # Examples
//!
//! ```
//! use combi_transport::{MockTransport, Transport};
//!
//! #[tokio::main]
//! async fn main() -> combi_transport::Result<()> {
//!     let (mut transport, handle) = MockTransport::new();
//!     transport.open().await?;
//!
//!     transport.write(b"SR").await?;
//!     let frame = transport.read(15).await?;
//!     assert_eq!(frame, b"S--000000000000".to_vec());
//!
//!     handle.inject(b"DO");
//!     assert_eq!(transport.read(2).await?, b"DO".to_vec());
//!     Ok(())
//! }
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use combi_core::{LoggingType, constants::*};
use tokio::sync::Notify;

use crate::error::{Result, TransportError};
use crate::traits::Transport;
use crate::wire_log::WireLogger;

/// Target name reported by mock transports.
pub const MOCK_TARGET: &str = "mock";

#[derive(Debug)]
struct DeviceState {
    open: bool,
    opens: usize,
    fail_opens: usize,
    fail_next_io: bool,
    responsive: bool,
    drawer_open: bool,
    lock: u8,
    electronic_key: [u8; EKEY_HEX_LEN],
    code_page_ok: bool,
    outgoing: VecDeque<u8>,
    written: Vec<Vec<u8>>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            open: false,
            opens: 0,
            fail_opens: 0,
            fail_next_io: false,
            responsive: true,
            drawer_open: false,
            lock: DEFAULT_LOCK_POSITION,
            electronic_key: [b'0'; EKEY_HEX_LEN],
            code_page_ok: true,
            outgoing: VecDeque::new(),
            written: Vec::new(),
        }
    }
}

impl DeviceState {
    fn status_frame(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(STATUS_FRAME_LEN);
        frame.push(TAG_STATUS);
        frame.push(if self.drawer_open { DRAWER_OPEN } else { b'-' });
        frame.push(self.lock);
        frame.extend_from_slice(&self.electronic_key);
        frame
    }

    /// React to one command the way the simulator does.
    fn handle_command(&mut self, data: &[u8]) {
        if !self.responsive {
            return;
        }
        match data {
            CMD_STATUS_REQUEST => {
                let frame = self.status_frame();
                self.outgoing.extend(frame);
            }
            CMD_DRAWER_OPEN => self.drawer_open = true,
            [CMD_CODE_PAGE_PREFIX, digit] => {
                let ok = self.code_page_ok
                    && (*digit as usize).wrapping_sub(b'0' as usize) < DISPLAY_CHARACTER_SETS.len();
                self.outgoing.push_back(TAG_DISPLAY);
                self.outgoing.push_back(if ok { DISPLAY_SUCCESS } else { b'0' });
                self.outgoing.push_back(b'0');
            }
            _ => {}
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<DeviceState>,
    incoming: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        // A poisoned lock only means a test panicked mid-update.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Transport end of the simulated device.
#[derive(Debug)]
pub struct MockTransport {
    shared: Arc<Shared>,
    timeout: Duration,
    log: WireLogger,
}

impl MockTransport {
    /// Create a simulated device and its control handle.
    pub fn new() -> (Self, MockTransportHandle) {
        let shared = Arc::new(Shared::default());
        let transport = Self {
            shared: shared.clone(),
            timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            log: WireLogger::new(LoggingType::default(), MOCK_TARGET),
        };
        (transport, MockTransportHandle { shared })
    }

    fn check_io(&self) -> Result<()> {
        let mut state = self.shared.lock();
        if !state.open {
            return Err(TransportError::not_open(MOCK_TARGET));
        }
        if std::mem::take(&mut state.fail_next_io) {
            state.open = false;
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "simulated I/O failure",
            )));
        }
        Ok(())
    }
}

impl Transport for MockTransport {
    async fn open(&mut self) -> Result<()> {
        let mut state = self.shared.lock();
        state.opens += 1;
        if state.fail_opens > 0 {
            state.fail_opens -= 1;
            return Err(TransportError::open_failed(MOCK_TARGET, "simulated open failure"));
        }
        state.open = true;
        state.outgoing.clear();
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.shared.lock().open = false;
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    async fn read(&mut self, max: usize) -> Result<Vec<u8>> {
        self.check_io()?;
        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            let notified = self.shared.incoming.notified();
            {
                let mut state = self.shared.lock();
                if !state.outgoing.is_empty() {
                    let n = max.min(state.outgoing.len());
                    let data: Vec<u8> = state.outgoing.drain(..n).collect();
                    drop(state);
                    self.log.inbound(&data);
                    return Ok(data);
                }
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.check_io()?;
        self.log.outbound(data);
        {
            let mut state = self.shared.lock();
            state.written.push(data.to_vec());
            state.handle_command(data);
        }
        self.shared.incoming.notify_waiters();
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn available(&mut self) -> Result<usize> {
        let state = self.shared.lock();
        if !state.open {
            return Err(TransportError::not_open(MOCK_TARGET));
        }
        Ok(state.outgoing.len())
    }

    fn target(&self) -> &str {
        MOCK_TARGET
    }

    fn is_open(&self) -> bool {
        self.shared.lock().open
    }
}

/// Handle for controlling a simulated device.
///
/// The handle can be cloned and shared across tasks.
#[derive(Debug, Clone)]
pub struct MockTransportHandle {
    shared: Arc<Shared>,
}

impl MockTransportHandle {
    /// Queue unsolicited bytes for the driver to read.
    pub fn inject(&self, data: &[u8]) {
        self.shared.lock().outgoing.extend(data.iter().copied());
        self.shared.incoming.notify_waiters();
    }

    /// Stop or resume answering commands.
    pub fn set_responsive(&self, responsive: bool) {
        self.shared.lock().responsive = responsive;
    }

    /// Make the next `count` open attempts fail.
    pub fn fail_opens(&self, count: usize) {
        self.shared.lock().fail_opens = count;
    }

    /// Make the next read or write fail with an I/O error and drop the
    /// connection.
    pub fn fail_next_io(&self) {
        self.shared.lock().fail_next_io = true;
        self.shared.incoming.notify_waiters();
    }

    /// Reject subsequent code page changes.
    pub fn reject_code_pages(&self) {
        self.shared.lock().code_page_ok = false;
    }

    /// Change the drawer state reported in status frames.
    pub fn set_drawer_open(&self, open: bool) {
        self.shared.lock().drawer_open = open;
    }

    /// Change the lock position reported in status frames.
    pub fn set_lock(&self, position: u8) {
        self.shared.lock().lock = position;
    }

    /// Change the electronic key reported in status frames.
    ///
    /// # Panics
    ///
    /// Panics if `hex` is not exactly 12 bytes long.
    pub fn set_electronic_key(&self, hex: &[u8]) {
        let mut state = self.shared.lock();
        state.electronic_key.copy_from_slice(hex);
    }

    pub fn is_drawer_open(&self) -> bool {
        self.shared.lock().drawer_open
    }

    pub fn is_open(&self) -> bool {
        self.shared.lock().open
    }

    /// Number of open attempts so far.
    pub fn open_attempts(&self) -> usize {
        self.shared.lock().opens
    }

    /// Every write received, in order.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.shared.lock().written.clone()
    }

    /// Number of writes equal to `command`.
    pub fn count_written(&self, command: &[u8]) -> usize {
        self.shared
            .lock()
            .written
            .iter()
            .filter(|w| w.as_slice() == command)
            .count()
    }

    /// Writes other than status requests, in order.
    pub fn commands(&self) -> Vec<Vec<u8>> {
        self.shared
            .lock()
            .written
            .iter()
            .filter(|w| w.as_slice() != CMD_STATUS_REQUEST)
            .cloned()
            .collect()
    }

    pub fn clear_written(&self) {
        self.shared.lock().written.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_status_reflects_state() {
        let (mut transport, handle) = MockTransport::new();
        transport.open().await.unwrap();
        handle.set_drawer_open(true);
        handle.set_lock(b'X');
        handle.set_electronic_key(b"0000000000AB");

        transport.write(b"SR").await.unwrap();
        assert_eq!(transport.available().unwrap(), STATUS_FRAME_LEN);
        let frame = transport.read(STATUS_FRAME_LEN).await.unwrap();
        assert_eq!(frame, b"SOX0000000000AB".to_vec());
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_times_out_empty() {
        let (mut transport, _handle) = MockTransport::new();
        transport.open().await.unwrap();
        transport.set_timeout(Duration::from_millis(100));
        let start = tokio::time::Instant::now();
        assert!(transport.read(1).await.unwrap().is_empty());
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresponsive_device_stays_silent() {
        let (mut transport, handle) = MockTransport::new();
        transport.open().await.unwrap();
        handle.set_responsive(false);
        transport.write(b"SR").await.unwrap();
        assert_eq!(transport.available().unwrap(), 0);
        assert_eq!(handle.count_written(b"SR"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drawer_open_and_code_page() {
        let (mut transport, handle) = MockTransport::new();
        transport.open().await.unwrap();
        transport.write(b"DO").await.unwrap();
        assert!(handle.is_drawer_open());

        transport.write(b"C2").await.unwrap();
        assert_eq!(transport.read(3).await.unwrap(), b"C10".to_vec());
        transport.write(b"C7").await.unwrap();
        assert_eq!(transport.read(3).await.unwrap(), b"C00".to_vec());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures() {
        let (mut transport, handle) = MockTransport::new();
        handle.fail_opens(1);
        assert!(transport.open().await.is_err());
        assert!(transport.open().await.is_ok());
        assert_eq!(handle.open_attempts(), 2);

        handle.fail_next_io();
        assert!(transport.read(1).await.is_err());
        assert!(!transport.is_open());
        assert!(transport.write(b"SR").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_injected_bytes_wake_reader() {
        let (mut transport, handle) = MockTransport::new();
        transport.open().await.unwrap();
        transport.set_timeout(Duration::from_secs(10));

        let injector = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            injector.inject(b"LX");
        });

        assert_eq!(transport.read(5).await.unwrap(), b"LX".to_vec());
    }
}
