//! The polling loop that owns the transport.
//!
//! One poller task runs per open physical connection. It is the only code
//! touching the transport, the only writer of device-reported state and the
//! only source of peripheral events.
//!
//! # Cycle
//!
//! ```text
//!          ┌──────────────────────────────────────────────┐
//!          ▼                                              │
//!   [IoError?] ──► reopen, write SR ──fail──► sleep ──────┤
//!          │                                              │
//!          ▼                                              │
//!     read_frame ──I/O error──► abort all, power off ─────┤
//!          │                                              │
//!     ┌────┴─────────┬───────────────┐                    │
//!  Timeout        Frame          Discarded ───────────────┤
//!     │              │                                    │
//!  retry < max?   apply state,                            │
//!   yes: resend   match in-flight                         │
//!   no: offline      │                                    │
//!     └──────┬───────┘                                    │
//!            ▼                                            │
//!   nothing buffered? flush responseless commands,        │
//!   poll delay, write in-flight command or SR ────────────┘
//! ```
//!
//! Loop state (in-flight command, retry counter, last poll time) lives in
//! [`Poller`] and is threaded through the step methods.

use std::sync::Arc;
use std::time::Duration;

use combi_core::{ConnectionState, PeripheralKind, PowerState};
use combi_protocol::{Command, Frame, MsrRead, ekey};
use combi_transport::{AnyTransport, Transport, TransportError};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::driver::Shared;
use crate::events::{DataEvent, ErrorEvent, EventKind, StatusUpdate};
use crate::queue::PendingCommand;
use crate::reader::{ReadOutcome, read_frame};

type StepResult = std::result::Result<(), TransportError>;

pub(crate) struct Poller {
    shared: Arc<Shared>,
    transport: AnyTransport,

    /// Command written and awaiting its response frame.
    in_flight: Option<PendingCommand>,

    /// Consecutive read cycles without a frame.
    retry: u32,

    last_poll: Instant,

    /// Signaled after the first read cycle.
    ready: Option<oneshot::Sender<()>>,
}

impl Poller {
    pub(crate) fn new(
        shared: Arc<Shared>,
        transport: AnyTransport,
        ready: oneshot::Sender<()>,
    ) -> Self {
        let now = Instant::now();
        let last_poll = now
            .checked_sub(shared.config.poll_delay())
            .unwrap_or(now);
        Self {
            shared,
            transport,
            in_flight: None,
            retry: 0,
            last_poll,
            ready: Some(ready),
        }
    }

    /// Run until shutdown is requested. Hands the transport back for the
    /// next start.
    pub(crate) async fn run(mut self) -> AnyTransport {
        debug!(port = %self.transport.target(), "Poller started");
        self.set_state(ConnectionState::IoError);

        while !self.shared.is_shutdown() {
            if self.state() == ConnectionState::IoError && !self.reopen().await {
                continue;
            }

            let outcome = read_frame(
                &mut self.transport,
                self.shared.config.request_timeout(),
                self.shared.config.character_timeout(),
            )
            .await;

            let step = match outcome {
                Ok(ReadOutcome::Frame(frame)) => self.on_frame(frame).await,
                Ok(ReadOutcome::Timeout) => self.on_timeout().await,
                Ok(ReadOutcome::Discarded(e)) => {
                    warn!(error = %e, "Frame discarded");
                    Ok(())
                }
                Err(e) => Err(e),
            };
            if let Err(e) = step {
                self.on_io_failure(e).await;
            }
            if let Some(ready) = self.ready.take() {
                let _ = ready.send(());
            }
        }

        self.stop().await;
        self.transport
    }

    fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.shared.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Connection state changed");
        }
    }

    /// Try to open the transport and request the device status.
    async fn reopen(&mut self) -> bool {
        let opened = match self.transport.open().await {
            Ok(()) => self.transport.write(&Command::StatusRequest.encode()).await,
            Err(e) => Err(e),
        };
        match opened {
            Ok(()) => {
                self.retry = 0;
                self.shared.mirror.set_code_page_accepted(false);
                self.set_state(ConnectionState::Online);
                info!(port = %self.transport.target(), "Device online");
                self.shared.router.broadcast_power(PowerState::Online);
                true
            }
            Err(e) => {
                debug!(port = %self.transport.target(), error = %e, "Open failed");
                let _ = self.transport.close().await;
                self.abort_all();
                self.pause(self.shared.config.request_timeout()).await;
                false
            }
        }
    }

    async fn on_io_failure(&mut self, error: TransportError) {
        warn!(port = %self.transport.target(), error = %error, "Transport failed");
        self.abort_all();
        self.set_state(ConnectionState::IoError);
        self.shared.router.broadcast_power(PowerState::Off);
        let _ = self.transport.close().await;
        self.pause(self.shared.config.poll_delay()).await;
    }

    /// No frame within the request timeout.
    async fn on_timeout(&mut self) -> StepResult {
        let attempt = self.retry;
        self.retry += 1;
        if attempt < self.shared.config.max_retry {
            debug!(attempt = self.retry, "No response, retrying");
            let request = match &self.in_flight {
                Some(pending) => pending.command.encode(),
                None => Command::StatusRequest.encode(),
            };
            return self.transport.write(&request).await;
        }

        self.retry = 0;
        if self.state() == ConnectionState::Online {
            self.set_state(ConnectionState::Offline);
            info!(port = %self.transport.target(), "Device offline");
            self.shared.router.broadcast_power(PowerState::Offline);
        }
        self.abort_all();
        self.service_queue().await
    }

    async fn on_frame(&mut self, frame: Frame) -> StepResult {
        if self.state() == ConnectionState::Offline {
            self.set_state(ConnectionState::Online);
            info!(port = %self.transport.target(), "Device back online");
            self.shared.router.broadcast_power(PowerState::Online);
        }
        self.retry = 0;

        let tag = frame.tag();
        self.apply(frame);

        if let Some(pending) = self.in_flight.take() {
            if pending.expected_response() == Some(tag) {
                pending.complete();
            } else {
                // Unsolicited frame while a response is outstanding.
                self.in_flight = Some(pending);
                return Ok(());
            }
        }
        self.service_queue().await
    }

    /// Mirror the frame's state and raise events for changes.
    fn apply(&self, frame: Frame) {
        let shared = &self.shared;
        match frame {
            Frame::Drawer { open } => self.apply_drawer(open),
            Frame::Lock { position } => self.apply_lock(position),
            Frame::ElectronicKey { value } => self.apply_electronic_key(&value),
            Frame::Status {
                drawer_open,
                lock,
                electronic_key,
            } => {
                self.apply_drawer(drawer_open);
                self.apply_lock(lock);
                self.apply_electronic_key(&electronic_key);
            }
            Frame::Keyboard { row, column } => match shared.config.key_table.value(row, column) {
                Some(value) => {
                    shared.router.emit(
                        PeripheralKind::Keyboard,
                        EventKind::Data(DataEvent::Key { value }),
                    );
                }
                None => debug!(row, column, "Unmapped key dropped"),
            },
            Frame::Msr { payload } => match MsrRead::parse(&payload) {
                Some(MsrRead::Data(tracks)) => {
                    shared.router.emit(
                        PeripheralKind::Msr,
                        EventKind::Data(DataEvent::Tracks(tracks)),
                    );
                }
                Some(MsrRead::Error(tracks)) => {
                    let extended = tracks.extended_error();
                    warn!(?extended, "Card read failed");
                    shared.router.emit(
                        PeripheralKind::Msr,
                        EventKind::Error(ErrorEvent::Tracks { tracks, extended }),
                    );
                }
                None => {}
            },
            Frame::Scanner(data) => {
                shared
                    .router
                    .emit(PeripheralKind::Scanner, EventKind::Data(DataEvent::Label(data)));
            }
            Frame::CodePage { success } => shared.mirror.set_code_page_accepted(success),
        }
    }

    fn apply_drawer(&self, open: bool) {
        if self.shared.mirror.update_drawer(open) {
            let update = if open {
                StatusUpdate::DrawerOpened
            } else {
                StatusUpdate::DrawerClosed
            };
            self.shared
                .router
                .emit(PeripheralKind::CashDrawer, EventKind::Status(update));
        }
    }

    fn apply_lock(&self, position: combi_core::LockPosition) {
        if self.shared.mirror.update_lock(position) {
            self.shared.router.emit(
                PeripheralKind::Keylock,
                EventKind::Status(StatusUpdate::KeyPosition(position)),
            );
        }
    }

    fn apply_electronic_key(&self, hex: &[u8]) {
        let value = if self.shared.config.binary_ekey {
            match ekey::to_binary(hex) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(error = %e, "Electronic key ignored");
                    return;
                }
            }
        } else {
            hex.to_vec()
        };
        if self.shared.mirror.update_electronic_key(value.clone()) {
            self.shared.router.emit(
                PeripheralKind::ElectronicKey,
                EventKind::Status(StatusUpdate::ElectronicKey(value)),
            );
        }
    }

    /// Write slot: responseless commands first, then the next command
    /// expecting a response, else an idle status request.
    async fn service_queue(&mut self) -> StepResult {
        if self.transport.available()? > 0 {
            return Ok(());
        }
        self.flush_responseless().await?;
        if self.in_flight.is_none() {
            self.poll_delay().await;
            self.flush_responseless().await?;
        }
        let request = match &self.in_flight {
            Some(pending) => pending.command.encode(),
            None => Command::StatusRequest.encode(),
        };
        self.transport.write(&request).await
    }

    /// Write queued responseless commands until one expecting a response
    /// comes up; that one becomes the in-flight command.
    async fn flush_responseless(&mut self) -> StepResult {
        if self.state() != ConnectionState::Online {
            self.abort_all();
            return Ok(());
        }
        while let Some(pending) = self.shared.queue.pop() {
            if pending.expected_response().is_some() {
                self.in_flight = Some(pending);
                break;
            }
            self.transport.write(&pending.command.encode()).await?;
            pending.complete();
        }
        Ok(())
    }

    /// Keep idle status requests at least one poll delay apart. A newly
    /// queued command ends the wait early.
    async fn poll_delay(&mut self) {
        let delay = self.shared.config.poll_delay();
        let due = self.last_poll + delay;
        if Instant::now() < due {
            self.idle_until(due).await;
            self.last_poll = due;
        } else {
            self.last_poll = Instant::now();
        }
    }

    /// Sleep that ends early on shutdown or new work.
    async fn pause(&self, duration: Duration) {
        self.idle_until(Instant::now() + duration).await;
    }

    /// Wait for `deadline`, shutdown or a queued command, whichever comes
    /// first. A wakeup finding neither is a permit left over from a
    /// command the poller already wrote, and is ignored.
    async fn idle_until(&self, deadline: Instant) {
        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);
        loop {
            if self.shared.is_shutdown() || !self.shared.queue.is_empty() {
                return;
            }
            tokio::select! {
                _ = &mut sleep => return,
                _ = self.shared.wake.notified() => {}
            }
        }
    }

    fn abort_all(&mut self) {
        let mut aborted = self.shared.queue.abort_all();
        if let Some(pending) = self.in_flight.take() {
            pending.abort();
            aborted += 1;
        }
        if aborted > 0 {
            debug!(count = aborted, "Commands aborted");
        }
    }

    async fn stop(&mut self) {
        self.abort_all();
        if self.transport.is_open() {
            let _ = self.transport.flush().await;
            let _ = self.transport.close().await;
        }
        self.set_state(ConnectionState::Closed);
        debug!(port = %self.transport.target(), "Poller stopped");
    }
}
