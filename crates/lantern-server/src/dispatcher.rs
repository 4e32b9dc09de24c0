//! Completion dispatcher.
//!
//! Blocks on the completion queue on its own thread and forwards every
//! completion to the owner thread, where the call it belongs to is
//! advanced. It never touches call state itself.

use crate::call::{dispatch, CallHost};
use crate::completion::CompletionQueue;
use crate::owner::{OwnerContext, OwnerHandle};
use std::io;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

pub struct CompletionDispatcher {
    join: JoinHandle<()>,
}

impl CompletionDispatcher {
    /// Starts draining `queue` into `owner`. The thread exits once the
    /// queue is shut down or the owner thread is gone.
    pub fn spawn<C>(mut queue: CompletionQueue, owner: OwnerHandle<C>) -> io::Result<Self>
    where
        C: CallHost + OwnerContext,
    {
        let join = thread::Builder::new()
            .name("lantern-dispatch".to_string())
            .spawn(move || {
                while let Some((tag, ok)) = queue.next() {
                    if owner.post(move |cx| dispatch(cx, tag, ok)).is_err() {
                        warn!("owner thread gone, dropping completion {}", tag);
                        break;
                    }
                }
                debug!("completion dispatcher exiting");
            })?;
        Ok(Self { join })
    }

    /// Waits for the dispatcher thread to exit.
    pub fn join(self) {
        if self.join.join().is_err() {
            warn!("completion dispatcher panicked");
        }
    }
}
