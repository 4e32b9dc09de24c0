//! The owner thread.
//!
//! The host graph is not thread-safe, so everything that touches it runs on
//! one dedicated thread. That thread owns a context value built in place by
//! a factory, and serially runs two kinds of work on it: tasks posted from
//! other threads, and a periodic tick that drives the observers.
//!
//! Other threads reach the context in one of two ways:
//!
//! - `post`: queue a task and return immediately (fire-and-forget)
//! - `invoke`: queue a task and block until it has produced its result

use crate::error::OwnerError;
use std::io;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

type Task<C> = Box<dyn FnOnce(&mut C) + Send>;

enum Message<C> {
    Run(Task<C>),
    Stop,
}

/// State that lives on the owner thread.
pub trait OwnerContext: 'static {
    /// Runs on every poll interval.
    fn on_tick(&mut self) {}
}

/// Handle for scheduling work on the owner thread. Cheap to clone.
pub struct OwnerHandle<C> {
    tx: mpsc::UnboundedSender<Message<C>>,
    owner: ThreadId,
}

impl<C> Clone for OwnerHandle<C> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            owner: self.owner,
        }
    }
}

impl<C: OwnerContext> OwnerHandle<C> {
    /// Queues `task` and returns without waiting for it.
    pub fn post<F>(&self, task: F) -> Result<(), OwnerError>
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        self.tx
            .send(Message::Run(Box::new(task)))
            .map_err(|_| OwnerError::Closed)
    }

    /// Runs `task` on the owner thread and waits for its result.
    ///
    /// Calling this from the owner thread itself would deadlock, so it is
    /// refused with `OwnerError::Reentrant`. Must not be called from inside
    /// an async runtime; use `invoke_async` there.
    pub fn invoke<R, F>(&self, task: F) -> Result<R, OwnerError>
    where
        F: FnOnce(&mut C) -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_owner_thread() {
            return Err(OwnerError::Reentrant);
        }
        let (tx, rx) = oneshot::channel();
        self.post(move |cx| {
            let _ = tx.send(task(cx));
        })?;
        rx.blocking_recv().map_err(|_| OwnerError::Closed)
    }

    /// Async flavour of `invoke`.
    pub async fn invoke_async<R, F>(&self, task: F) -> Result<R, OwnerError>
    where
        F: FnOnce(&mut C) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.post(move |cx| {
            let _ = tx.send(task(cx));
        })?;
        rx.await.map_err(|_| OwnerError::Closed)
    }

    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.owner
    }
}

/// A running owner thread.
pub struct OwnerThread<C> {
    handle: OwnerHandle<C>,
    join: Option<JoinHandle<()>>,
}

impl<C: OwnerContext> OwnerThread<C> {
    /// Spawns the thread, builds the context on it with `factory`, and
    /// starts ticking every `poll_interval`.
    pub fn spawn<F>(name: &str, poll_interval: Duration, factory: F) -> io::Result<Self>
    where
        F: FnOnce() -> C + Send + 'static,
    {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let (tx, mut rx) = mpsc::unbounded_channel::<Message<C>>();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    let mut cx = factory();
                    let mut ticker = tokio::time::interval(poll_interval);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    info!("owner thread running, polling every {:?}", poll_interval);

                    loop {
                        tokio::select! {
                            message = rx.recv() => match message {
                                Some(Message::Run(task)) => task(&mut cx),
                                Some(Message::Stop) | None => break,
                            },
                            _ = ticker.tick() => cx.on_tick(),
                        }
                    }
                    debug!("owner thread exiting");
                });
            })?;

        let handle = OwnerHandle {
            tx,
            owner: join.thread().id(),
        };
        Ok(Self {
            handle,
            join: Some(join),
        })
    }

    pub fn handle(&self) -> OwnerHandle<C> {
        self.handle.clone()
    }

    /// Stops the thread after the tasks already queued, and joins it.
    pub fn stop(mut self) {
        self.shutdown();
    }
}

impl<C> OwnerThread<C> {
    fn shutdown(&mut self) {
        let _ = self.handle.tx.send(Message::Stop);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                error!("owner thread panicked");
            }
        }
    }
}

impl<C> Drop for OwnerThread<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counter {
        value: u32,
        ticks: Arc<AtomicUsize>,
    }

    impl OwnerContext for Counter {
        fn on_tick(&mut self) {
            self.ticks.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn spawn_counter(ticks: Arc<AtomicUsize>) -> OwnerThread<Counter> {
        OwnerThread::spawn("test-owner", Duration::from_millis(5), move || Counter {
            value: 0,
            ticks,
        })
        .unwrap()
    }

    #[test]
    fn test_post_and_invoke_run_in_order() {
        let owner = spawn_counter(Arc::new(AtomicUsize::new(0)));
        let handle = owner.handle();

        handle.post(|cx| cx.value += 1).unwrap();
        handle.post(|cx| cx.value *= 10).unwrap();
        let value = handle.invoke(|cx| cx.value).unwrap();
        assert_eq!(value, 10);
        owner.stop();
    }

    #[test]
    fn test_invoke_from_owner_thread_is_refused() {
        let owner = spawn_counter(Arc::new(AtomicUsize::new(0)));
        let handle = owner.handle();
        let inner = handle.clone();

        let result = handle
            .invoke(move |_| inner.invoke(|cx| cx.value).map(|_| ()))
            .unwrap();
        assert!(matches!(result, Err(OwnerError::Reentrant)));
        owner.stop();
    }

    #[test]
    fn test_ticks_run_on_interval() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let owner = spawn_counter(ticks.clone());
        thread::sleep(Duration::from_millis(60));
        owner.stop();
        assert!(ticks.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn test_post_after_stop_fails() {
        let owner = spawn_counter(Arc::new(AtomicUsize::new(0)));
        let handle = owner.handle();
        owner.stop();
        assert!(matches!(handle.post(|_| {}), Err(OwnerError::Closed)));
    }

    #[tokio::test]
    async fn test_invoke_async_from_runtime() {
        let owner = spawn_counter(Arc::new(AtomicUsize::new(0)));
        let handle = owner.handle();

        handle.post(|cx| cx.value = 7).unwrap();
        assert_eq!(handle.invoke_async(|cx| cx.value * 2).await, Ok(14));

        owner.stop();
        assert_eq!(
            handle.invoke_async(|cx| cx.value).await,
            Err(OwnerError::Closed)
        );
    }
}
