//! Byte-stream transport abstraction.
//!
//! The driver owns exactly one transport per physical connection and only
//! the poller task touches it, so implementations need no internal locking.
//!
//! All methods use native `async fn` in traits. The driver works with the
//! concrete [`AnyTransport`](crate::AnyTransport) enum so the poller future
//! stays `Send`.

#![allow(async_fn_in_trait)]

use std::time::Duration;

use crate::error::Result;

/// A bidirectional byte stream with read timeouts.
///
/// # Read semantics
///
/// [`Transport::read`] waits up to the configured timeout for the first
/// byte, then returns whatever is immediately available up to `max` bytes.
/// An empty result means the timeout expired. A read never blocks longer
/// than one timeout period.
pub trait Transport {
    /// Connect or open the underlying device.
    async fn open(&mut self) -> Result<()>;

    /// Release the underlying device. Closing a closed transport is a no-op.
    async fn close(&mut self) -> Result<()>;

    /// Timeout applied to subsequent reads.
    fn set_timeout(&mut self, timeout: Duration);

    /// Read up to `max` bytes (see the trait docs for timeout behavior).
    async fn read(&mut self, max: usize) -> Result<Vec<u8>>;

    /// Write all bytes.
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Flush buffered output.
    async fn flush(&mut self) -> Result<()>;

    /// Number of received bytes that can be read without waiting.
    fn available(&mut self) -> Result<usize>;

    /// Connection target (port name or address) for diagnostics.
    fn target(&self) -> &str;

    fn is_open(&self) -> bool;
}
