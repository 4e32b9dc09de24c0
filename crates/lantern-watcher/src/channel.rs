//! Thread-safe FIFO between an observer and its consumer.
//!
//! Observers push on the owner thread. Consumers either block in
//! `wait_pop` or, for completion-queue driven streams, poll with
//! `is_empty`/`pop` and register a one-shot waker that fires on the next
//! push. Closing the channel releases every blocked waiter.

use crate::event::{ChangeEvent, PropertyEvent};
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

type Waker = Box<dyn FnOnce() + Send>;

struct State<T> {
    queue: VecDeque<T>,
    waker: Option<Waker>,
    closed: bool,
}

/// Multi-producer, multi-consumer event queue.
pub struct EventChannel<T> {
    state: Mutex<State<T>>,
    ready: Condvar,
}

/// Channel carrying structural change events.
pub type ChangeEventChannel = EventChannel<ChangeEvent>;

/// Channel carrying property change events.
pub type PropertyEventChannel = EventChannel<PropertyEvent>;

impl<T> Default for EventChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventChannel<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                waker: None,
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends an event. Returns `false` if the channel is closed.
    pub fn push(&self, item: T) -> bool {
        let waker = {
            let mut state = self.lock();
            if state.closed {
                return false;
            }
            state.queue.push_back(item);
            state.waker.take()
        };
        self.ready.notify_one();
        if let Some(wake) = waker {
            wake();
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Removes the oldest event.
    ///
    /// # Panics
    ///
    /// Panics if the channel is empty. Check `is_empty` first.
    pub fn pop(&self) -> T {
        match self.lock().queue.pop_front() {
            Some(item) => item,
            None => panic!("pop called on an empty event channel"),
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        self.lock().queue.pop_front()
    }

    /// Blocks until an event is available. Returns `None` once the channel
    /// is closed and drained.
    pub fn wait_pop(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            if let Some(item) = state.queue.pop_front() {
                return Some(item);
            }
            if state.closed {
                return None;
            }
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like `wait_pop`, giving up after `timeout`.
    pub fn wait_pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if let Some(item) = state.queue.pop_front() {
                return Some(item);
            }
            let now = Instant::now();
            if state.closed || now >= deadline {
                return None;
            }
            state = self
                .ready
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Registers a one-shot callback run on the next push.
    ///
    /// Runs it right away if events are already queued or the channel is
    /// closed. Replaces any previously registered waker.
    pub fn set_waker<F>(&self, wake: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let fire_now = {
            let mut state = self.lock();
            if state.queue.is_empty() && !state.closed {
                state.waker = Some(Box::new(wake));
                None
            } else {
                Some(wake)
            }
        };
        if let Some(wake) = fire_now {
            wake();
        }
    }

    /// Rejects further pushes and wakes everyone waiting.
    pub fn close(&self) {
        let waker = {
            let mut state = self.lock();
            state.closed = true;
            state.waker.take()
        };
        self.ready.notify_all();
        if let Some(wake) = waker {
            wake();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let channel = EventChannel::new();
        channel.push(1);
        channel.push(2);
        channel.push(3);

        assert_eq!(channel.len(), 3);
        assert_eq!(channel.pop(), 1);
        assert_eq!(channel.try_pop(), Some(2));
        assert_eq!(channel.pop(), 3);
        assert!(channel.is_empty());
        assert_eq!(channel.try_pop(), None);
    }

    #[test]
    #[should_panic(expected = "empty event channel")]
    fn test_pop_on_empty_panics() {
        let channel: EventChannel<u32> = EventChannel::new();
        channel.pop();
    }

    #[test]
    fn test_wait_pop_blocks_until_push() {
        let channel = Arc::new(EventChannel::new());
        let consumer = {
            let channel = channel.clone();
            thread::spawn(move || channel.wait_pop())
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!consumer.is_finished());
        channel.push("event");
        assert_eq!(consumer.join().unwrap(), Some("event"));
        assert!(channel.is_empty());
    }

    #[test]
    fn test_close_releases_waiters() {
        let channel: Arc<EventChannel<u32>> = Arc::new(EventChannel::new());
        let consumer = {
            let channel = channel.clone();
            thread::spawn(move || channel.wait_pop())
        };

        thread::sleep(Duration::from_millis(20));
        channel.close();
        assert_eq!(consumer.join().unwrap(), None);
        assert!(!channel.push(1));
    }

    #[test]
    fn test_wait_pop_timeout() {
        let channel: EventChannel<u32> = EventChannel::new();
        assert_eq!(channel.wait_pop_timeout(Duration::from_millis(10)), None);
        channel.push(9);
        assert_eq!(channel.wait_pop_timeout(Duration::from_millis(10)), Some(9));
    }

    #[test]
    fn test_waker_fires_once_on_push() {
        let channel = EventChannel::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = fired.clone();
        channel.set_waker(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        channel.push(1);
        channel.push(2);
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // Data already queued: fires immediately.
        let counter = fired.clone();
        channel.set_waker(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }
}
