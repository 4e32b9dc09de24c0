//! Completion queue.
//!
//! Every asynchronous step of a call (request delivered, reply written,
//! stream woken, call cancelled) completes by pushing the call's `Tag` and
//! an `ok` flag here. A single consumer drains the queue in order.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

static NEXT_TAG: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of one call instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(u64);

impl Tag {
    pub fn next() -> Self {
        Self(NEXT_TAG.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

enum Signal {
    Event(Tag, bool),
    Shutdown,
}

/// Creates a connected sender/queue pair.
pub fn completion_queue() -> (CompletionSender, CompletionQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CompletionSender { tx }, CompletionQueue { rx })
}

/// Producer side. Cheap to clone.
#[derive(Clone)]
pub struct CompletionSender {
    tx: mpsc::UnboundedSender<Signal>,
}

impl CompletionSender {
    /// Enqueues a completion. Returns `false` once the queue is gone.
    pub fn push(&self, tag: Tag, ok: bool) -> bool {
        self.tx.send(Signal::Event(tag, ok)).is_ok()
    }

    /// Makes `next` return `None` after everything queued so far.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Signal::Shutdown);
    }
}

/// Consumer side.
pub struct CompletionQueue {
    rx: mpsc::UnboundedReceiver<Signal>,
}

impl CompletionQueue {
    /// Blocks until the next completion.
    ///
    /// Must not be called from inside an async runtime.
    pub fn next(&mut self) -> Option<(Tag, bool)> {
        match self.rx.blocking_recv() {
            Some(Signal::Event(tag, ok)) => Some((tag, ok)),
            Some(Signal::Shutdown) | None => None,
        }
    }

    /// Returns the next completion if one is already queued.
    pub fn try_next(&mut self) -> Option<(Tag, bool)> {
        match self.rx.try_recv() {
            Ok(Signal::Event(tag, ok)) => Some((tag, ok)),
            _ => None,
        }
    }
}
