//! In-flight command tracking.
//!
//! Every dispatched command parks a [`PendingRequest`] here until its reply
//! arrives, the link drops, or the command is cancelled. The registry is
//! the single source of truth for what the daemon still owes us: bulk
//! failure on disconnect and reply correlation both operate on it.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::body::Body;
use crate::error::{ChannelError, CommandError, Result};

/// Final result of one command: a decoded body or a command-level failure.
pub type CommandOutcome = std::result::Result<Body, CommandError>;

/// Future side of a submitted command.
///
/// Resolves when the reply arrives or the command fails. If the engine is
/// torn down without resolving the command, this yields
/// [`CommandError::RadioNotAvailable`].
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<CommandOutcome>,
}

impl Future for Completion {
    type Output = CommandOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(CommandError::RadioNotAvailable)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Resolver side of a submitted command.
///
/// Dropping an unresolved sink fails the matching [`Completion`] with
/// [`CommandError::RadioNotAvailable`].
#[derive(Debug)]
pub(crate) struct CompletionSink {
    tx: Option<oneshot::Sender<CommandOutcome>>,
}

impl CompletionSink {
    /// Creates a connected sink/completion pair.
    pub fn pair() -> (Self, Completion) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, Completion { rx })
    }

    /// Creates a sink with no listener, for commands synthesized
    /// internally where nobody awaits the outcome.
    pub fn discard() -> Self {
        Self { tx: None }
    }

    /// Resolves the completion. A vanished listener is not an error.
    pub fn complete(mut self, outcome: CommandOutcome) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(outcome);
        }
    }
}

/// One command awaiting its reply.
#[derive(Debug)]
pub(crate) struct PendingRequest {
    pub serial: i32,
    pub request: i32,
    sink: CompletionSink,
}

impl PendingRequest {
    pub fn new(serial: i32, request: i32, sink: CompletionSink) -> Self {
        Self {
            serial,
            request,
            sink,
        }
    }

    /// Resolves the waiter with the command's final outcome.
    pub fn complete(self, outcome: CommandOutcome) {
        self.sink.complete(outcome);
    }
}

/// Serial-keyed table of in-flight commands.
#[derive(Debug, Default)]
pub(crate) struct PendingRegistry {
    inner: Mutex<HashMap<i32, PendingRequest>>,
    spurious: AtomicU64,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<i32, PendingRequest>> {
        // A panic while holding this lock cannot leave the map in a
        // half-updated state; recover the guard and keep serving.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers an in-flight command under its serial.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::DuplicateSerial`] when the serial is already
    /// occupied; the rejected request is dropped, which fails its waiter.
    pub fn register(&self, req: PendingRequest) -> Result<()> {
        let mut map = self.lock();
        match map.entry(req.serial) {
            Entry::Occupied(_) => Err(ChannelError::DuplicateSerial(req.serial)),
            Entry::Vacant(slot) => {
                slot.insert(req);
                Ok(())
            }
        }
    }

    /// Removes and returns the command matching `serial`, if any.
    pub fn resolve(&self, serial: i32) -> Option<PendingRequest> {
        self.lock().remove(&serial)
    }

    /// Removes every in-flight command, for bulk failure.
    pub fn drain_all(&self) -> Vec<PendingRequest> {
        self.lock().drain().map(|(_, req)| req).collect()
    }

    /// Number of commands still awaiting replies.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Counts a reply whose serial matched nothing.
    pub fn record_spurious(&self) {
        self.spurious.fetch_add(1, Ordering::Relaxed);
    }

    /// Replies received with no matching in-flight command.
    pub fn spurious_count(&self) -> u64 {
        self.spurious.load(Ordering::Relaxed)
    }
}
