//! Byte-stream transports for the combi device.
//!
//! The driver talks to the device through the [`Transport`] trait: open,
//! close, timed reads, writes, flush and an "available bytes" query. Three
//! implementations exist:
//!
//! - [`TcpTransport`]: TCP connection to a device simulator
//! - [`SerialTransport`]: serial line via `tokio-serial`
//! - [`MockTransport`]: in-process simulated device for tests
//!
//! [`AnyTransport`] wraps them for static dispatch. Traffic is logged at
//! `trace` level through [`wire_log`].

pub mod any;
pub mod error;
pub mod mock;
pub mod serial;
pub mod tcp;
pub mod traits;
pub mod wire_log;

pub use any::AnyTransport;
pub use error::{Result, TransportError};
pub use mock::{MockTransport, MockTransportHandle};
pub use serial::{Parity, SerialSettings, SerialTransport};
pub use tcp::TcpTransport;
pub use traits::Transport;
