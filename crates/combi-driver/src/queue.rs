//! Outstanding application commands.
//!
//! Applications push commands and await a oneshot completion signal. The
//! poller pops them in FIFO order and signals every command exactly once:
//! [`Completion::Done`] when written (responseless) or confirmed by its
//! response frame, [`Completion::Aborted`] when the connection leaves the
//! online state or the driver closes.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use combi_protocol::Command;
use tokio::sync::oneshot;

/// Final state of a queued command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Done,
    Aborted,
}

/// A command owned by the queue or the poller until it is signaled.
#[derive(Debug)]
pub struct PendingCommand {
    pub command: Command,
    done: oneshot::Sender<Completion>,
}

impl PendingCommand {
    pub fn new(command: Command) -> (Self, oneshot::Receiver<Completion>) {
        let (done, rx) = oneshot::channel();
        (Self { command, done }, rx)
    }

    /// Tag of the frame that completes this command, if any.
    pub fn expected_response(&self) -> Option<u8> {
        self.command.expected_response()
    }

    pub fn complete(self) {
        // The caller may have stopped waiting; nothing to do then.
        let _ = self.done.send(Completion::Done);
    }

    pub fn abort(self) {
        let _ = self.done.send(Completion::Aborted);
    }
}

/// Thread-safe FIFO shared by application handles and the poller.
#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    inner: Arc<Mutex<VecDeque<PendingCommand>>>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<PendingCommand>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a command and return its completion signal.
    pub fn push(&self, command: Command) -> oneshot::Receiver<Completion> {
        let (pending, rx) = PendingCommand::new(command);
        self.lock().push_back(pending);
        rx
    }

    pub fn pop(&self) -> Option<PendingCommand> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Abort every queued command. Returns how many were aborted.
    pub fn abort_all(&self) -> usize {
        let drained: Vec<_> = self.lock().drain(..).collect();
        let count = drained.len();
        for pending in drained {
            pending.abort();
        }
        count
    }
}
