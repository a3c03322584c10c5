//! Shared driver for one physical connection.
//!
//! Every peripheral handle bound to the same connection target shares one
//! [`Driver`]. The driver counts opens: the first open starts the poller,
//! the last close stops it and waits for it to exit.
//!
//! ```text
//!   handles ──execute()──► CommandQueue ──► Poller ──► Transport
//!      ▲                                      │
//!      ├──────── EventRouter ◄────────────────┤
//!      └──────── DeviceMirror / state ◄───────┘
//! ```
//!
//! # Examples
//!
//! ```no_run
//! use combi_driver::{Driver, DriverConfig};
//! use combi_protocol::Command;
//!
//! # async fn example() -> combi_driver::Result<()> {
//! let driver = Driver::new(DriverConfig::new("127.0.0.1:56789"))?;
//! driver.open().await?;
//! driver.execute(Command::BeepOn).await?;
//! println!("{}", driver.check_health());
//! driver.close().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use combi_core::{ConnectionState, PowerState};
use combi_protocol::Command;
use combi_transport::AnyTransport;
use tokio::sync::{Mutex, Notify, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::DriverConfig;
use crate::error::{DriverError, Result};
use crate::events::EventRouter;
use crate::mirror::{DeviceMirror, DeviceSnapshot};
use crate::poller::Poller;
use crate::queue::{CommandQueue, Completion};

/// State shared between the driver, its handles and the poller task.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) config: DriverConfig,
    pub(crate) queue: CommandQueue,
    pub(crate) mirror: DeviceMirror,
    pub(crate) router: EventRouter,
    pub(crate) state: watch::Sender<ConnectionState>,

    /// Wakes the poller from its idle waits.
    pub(crate) wake: Notify,
    shutdown: AtomicBool,
}

impl Shared {
    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
struct Lifecycle {
    open_count: usize,

    /// Transport while no poller owns it.
    transport: Option<AnyTransport>,
    task: Option<JoinHandle<AnyTransport>>,
}

/// Driver for one physical connection.
#[derive(Debug)]
pub struct Driver {
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
}

impl Driver {
    /// Create a driver for the configured target.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid.
    pub fn new(config: DriverConfig) -> Result<Self> {
        config.validate()?;
        let transport = config.transport()?;
        Ok(Self::with_transport(config, transport))
    }

    /// Create a driver using a given transport instead of the one the
    /// target names.
    pub fn with_transport(config: DriverConfig, transport: impl Into<AnyTransport>) -> Self {
        let (state, _rx) = watch::channel(ConnectionState::Closed);
        Self {
            shared: Arc::new(Shared {
                config,
                queue: CommandQueue::new(),
                mirror: DeviceMirror::new(),
                router: EventRouter::new(),
                state,
                wake: Notify::new(),
                shutdown: AtomicBool::new(false),
            }),
            lifecycle: Mutex::new(Lifecycle {
                open_count: 0,
                transport: Some(transport.into()),
                task: None,
            }),
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.shared.config
    }

    /// Connection target this driver talks to.
    pub fn target(&self) -> &str {
        &self.shared.config.com_port
    }

    /// Register one more user of the connection.
    ///
    /// The first open starts the poller and waits until it finished its
    /// first read cycle, at most `(MaxRetry + 2) * RequestTimeout`, so the
    /// initial device state is known on return.
    ///
    /// # Errors
    ///
    /// Fails if the transport was lost by a crashed poller.
    pub async fn open(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.open_count > 0 {
            lifecycle.open_count += 1;
            return Ok(());
        }
        let transport = lifecycle
            .transport
            .take()
            .ok_or_else(|| DriverError::illegal("Transport unavailable"))?;

        self.shared.shutdown.store(false, Ordering::Release);
        let (ready_tx, ready_rx) = oneshot::channel();
        let poller = Poller::new(self.shared.clone(), transport, ready_tx);
        lifecycle.task = Some(tokio::spawn(poller.run()));
        lifecycle.open_count = 1;
        debug!(port = %self.target(), "Connection opened");

        let startup = self.shared.config.startup_timeout();
        if tokio::time::timeout(startup, ready_rx).await.is_err() {
            debug!(port = %self.target(), "No read cycle completed during startup");
        }
        Ok(())
    }

    /// Release one user of the connection. The last close stops the poller
    /// and returns once it has exited and the transport is closed.
    ///
    /// # Errors
    ///
    /// [`DriverError::IllegalState`] if the driver is not open.
    pub async fn close(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        match lifecycle.open_count {
            0 => return Err(DriverError::illegal("Driver not open")),
            1 => {}
            _ => {
                lifecycle.open_count -= 1;
                return Ok(());
            }
        }
        lifecycle.open_count = 0;

        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.wake.notify_one();
        if let Some(task) = lifecycle.task.take() {
            match task.await {
                Ok(transport) => lifecycle.transport = Some(transport),
                Err(e) => warn!(port = %self.target(), error = %e, "Poller terminated abnormally"),
            }
        }
        debug!(port = %self.target(), "Connection closed");
        Ok(())
    }

    pub async fn open_count(&self) -> usize {
        self.lifecycle.lock().await.open_count
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn power_state(&self) -> PowerState {
        self.connection_state().power_state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Last known device state.
    pub fn snapshot(&self) -> DeviceSnapshot {
        self.shared.mirror.snapshot()
    }

    pub fn mirror(&self) -> &DeviceMirror {
        &self.shared.mirror
    }

    pub fn subscribe_device(&self) -> watch::Receiver<DeviceSnapshot> {
        self.shared.mirror.subscribe()
    }

    pub fn router(&self) -> &EventRouter {
        &self.shared.router
    }

    /// Fail unless commands can be sent right now.
    ///
    /// # Errors
    ///
    /// [`DriverError::Offline`], [`DriverError::PowerOff`] or
    /// [`DriverError::Closed`] depending on the connection state.
    pub fn ensure_online(&self) -> Result<()> {
        match self.connection_state() {
            ConnectionState::Online => Ok(()),
            ConnectionState::Offline => Err(DriverError::Offline),
            ConnectionState::IoError => Err(DriverError::PowerOff),
            ConnectionState::Closed => Err(DriverError::Closed),
        }
    }

    /// Queue a command and wait until the device confirmed it (or, for
    /// responseless commands, until it was written).
    ///
    /// # Errors
    ///
    /// Fails fast without queuing when the device is not online, and with
    /// [`DriverError::NoResponse`] when the command is aborted.
    pub async fn execute(&self, command: Command) -> Result<()> {
        self.ensure_online()?;
        let description = command.to_string();
        let done = self.shared.queue.push(command);
        self.shared.wake.notify_one();
        match done.await {
            Ok(Completion::Done) => Ok(()),
            Ok(Completion::Aborted) | Err(_) => Err(DriverError::no_response(format!(
                "No response to {}",
                description
            ))),
        }
    }

    /// Queue a command without waiting for it.
    ///
    /// # Errors
    ///
    /// Fails when the device is not online.
    pub fn post(&self, command: Command) -> Result<()> {
        self.ensure_online()?;
        drop(self.shared.queue.push(command));
        self.shared.wake.notify_one();
        Ok(())
    }

    /// Internal health check text.
    pub fn check_health(&self) -> String {
        let result = if self.connection_state().is_online() {
            "OK"
        } else {
            "Failed"
        };
        format!("Internal CheckHealth: {}.", result)
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.wake.notify_one();
    }
}
