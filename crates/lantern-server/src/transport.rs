//! Completion-queue style RPC transport.
//!
//! The transport matches incoming requests with armed call instances. A
//! call arms itself with `request_call(method, tag)`. When a request for
//! that method arrives, the transport hands it to the oldest armed tag and
//! completes the tag on the completion queue. Every reply operation
//! (`finish`, `write`, ...) completes the tag again once the reply is
//! queued on the connection, which is what drives each call forward.
//!
//! Requests that arrive before any tag is armed wait in a per-method
//! backlog, so nothing is dropped between one call taking a request and
//! its sibling arming.

use crate::completion::{CompletionSender, Tag};
use crate::protocol::{Outbound, Status};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Identity of one client connection.
pub type ConnectionId = Uuid;

/// Where replies for a connection go.
pub type ReplySink = mpsc::UnboundedSender<Outbound>;

/// A request as received from a connection.
#[derive(Debug, Clone)]
pub struct IncomingCall {
    pub connection: ConnectionId,
    pub request_id: Value,
    pub method: String,
    pub params: Value,
    pub reply: ReplySink,
}

struct ActiveCall {
    connection: ConnectionId,
    request_id: Value,
    reply: ReplySink,
}

#[derive(Default)]
struct State {
    methods: HashSet<String>,
    acceptors: HashMap<String, VecDeque<Tag>>,
    backlog: HashMap<String, VecDeque<IncomingCall>>,
    delivered: HashMap<Tag, IncomingCall>,
    active: HashMap<Tag, ActiveCall>,
    shut_down: bool,
}

/// Shared handle to the transport. Clones refer to the same tables.
#[derive(Clone)]
pub struct Transport {
    state: Arc<Mutex<State>>,
    completions: CompletionSender,
}

impl Transport {
    pub fn new(completions: CompletionSender) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            completions,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn completions(&self) -> &CompletionSender {
        &self.completions
    }

    /// Declares a method so requests for it are accepted.
    pub fn register_method(&self, method: &str) {
        self.lock().methods.insert(method.to_string());
    }

    /// Number of tags currently armed for `method`.
    pub fn armed(&self, method: &str) -> usize {
        self.lock().acceptors.get(method).map_or(0, VecDeque::len)
    }

    /// Number of calls holding a request and not yet finished.
    pub fn active(&self) -> usize {
        self.lock().active.len()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Server side
    // ─────────────────────────────────────────────────────────────────────

    /// Arms `tag` to receive the next request for `method`.
    pub fn request_call(&self, method: &str, tag: Tag) {
        let mut state = self.lock();
        if state.shut_down {
            drop(state);
            self.completions.push(tag, false);
            return;
        }
        let waiting = state
            .backlog
            .get_mut(method)
            .and_then(VecDeque::pop_front);
        match waiting {
            Some(call) => {
                state.delivered.insert(tag, call);
                drop(state);
                self.completions.push(tag, true);
            }
            None => state
                .acceptors
                .entry(method.to_string())
                .or_default()
                .push_back(tag),
        }
    }

    /// Takes the request delivered to `tag`, marking the call active.
    ///
    /// Returns `None` if the request was withdrawn in the meantime, e.g.
    /// because its connection closed. Missing params read as `{}`.
    pub fn take_request(&self, tag: Tag) -> Option<Value> {
        let mut state = self.lock();
        let call = state.delivered.remove(&tag)?;
        state.active.insert(
            tag,
            ActiveCall {
                connection: call.connection,
                request_id: call.request_id,
                reply: call.reply,
            },
        );
        Some(match call.params {
            Value::Null => Value::Object(Default::default()),
            params => params,
        })
    }

    /// Sends a successful unary result and completes the tag.
    pub fn finish(&self, tag: Tag, result: Value) {
        self.reply_and_close(tag, |id| Outbound::Result { id, result });
    }

    /// Sends an error and completes the tag.
    pub fn finish_with_error(&self, tag: Tag, status: Status) {
        self.reply_and_close(tag, |id| Outbound::Error { id, status });
    }

    /// Ends a stream with `status`. An OK status reads `{"done": true}`.
    pub fn finish_stream(&self, tag: Tag, status: Status) {
        if status.is_ok() {
            self.finish(tag, serde_json::json!({ "done": true }));
        } else {
            self.finish_with_error(tag, status);
        }
    }

    /// Sends one stream item and completes the tag.
    pub fn write(&self, tag: Tag, item: Value) {
        let sent = {
            let state = self.lock();
            state.active.get(&tag).map(|call| {
                call.reply
                    .send(Outbound::Item {
                        id: call.request_id.clone(),
                        item,
                    })
                    .is_ok()
            })
        };
        self.completions.push(tag, sent.unwrap_or(false));
    }

    fn reply_and_close(&self, tag: Tag, build: impl FnOnce(Value) -> Outbound) {
        let call = self.lock().active.remove(&tag);
        let ok = match call {
            Some(call) => call.reply.send(build(call.request_id)).is_ok(),
            None => false,
        };
        self.completions.push(tag, ok);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Connection side
    // ─────────────────────────────────────────────────────────────────────

    /// Routes a request from a connection to an armed call.
    pub fn deliver(&self, call: IncomingCall) {
        let mut state = self.lock();
        if state.shut_down {
            drop(state);
            let _ = call.reply.send(Outbound::Error {
                id: call.request_id,
                status: shutting_down(),
            });
            return;
        }
        if !state.methods.contains(&call.method) {
            drop(state);
            debug!("unknown method {}", call.method);
            let _ = call.reply.send(Outbound::Error {
                id: call.request_id,
                status: Status::unimplemented(format!("Method not found: {}", call.method)),
            });
            return;
        }
        let acceptor = state
            .acceptors
            .get_mut(&call.method)
            .and_then(VecDeque::pop_front);
        match acceptor {
            Some(tag) => {
                state.delivered.insert(tag, call);
                drop(state);
                self.completions.push(tag, true);
            }
            None => {
                debug!("no armed call for {}, queueing", call.method);
                state
                    .backlog
                    .entry(call.method.clone())
                    .or_default()
                    .push_back(call);
            }
        }
    }

    /// Cancels the call started by `request_id` on `connection`.
    pub fn cancel(&self, connection: ConnectionId, request_id: &Value) {
        self.cancel_where(|conn, id| conn == connection && id == request_id);
    }

    /// Cancels every call of a connection that went away.
    pub fn connection_closed(&self, connection: ConnectionId) {
        self.cancel_where(|conn, _| conn == connection);
    }

    fn cancel_where(&self, matches: impl Fn(ConnectionId, &Value) -> bool) {
        let cancelled: Vec<Tag> = {
            let mut state = self.lock();
            for queue in state.backlog.values_mut() {
                queue.retain(|c| !matches(c.connection, &c.request_id));
            }
            state
                .delivered
                .retain(|_, c| !matches(c.connection, &c.request_id));
            let tags: Vec<Tag> = state
                .active
                .iter()
                .filter(|(_, c)| matches(c.connection, &c.request_id))
                .map(|(tag, _)| *tag)
                .collect();
            for tag in &tags {
                state.active.remove(tag);
            }
            tags
        };
        for tag in cancelled {
            debug!("cancelling call {}", tag);
            self.completions.push(tag, false);
        }
    }

    /// Refuses new requests and fails every armed and active call.
    ///
    /// Every request that already reached the server, whether queued,
    /// delivered or being processed, gets a `Cancelled` error.
    pub fn shutdown(&self) {
        let (armed, delivered, active, backlog) = {
            let mut guard = self.lock();
            let state = &mut *guard;
            state.shut_down = true;
            let armed: Vec<Tag> = state
                .acceptors
                .drain()
                .flat_map(|(_, tags)| tags)
                .collect();
            let delivered: Vec<(Tag, IncomingCall)> = state.delivered.drain().collect();
            let active: Vec<(Tag, ActiveCall)> = state.active.drain().collect();
            let backlog: Vec<IncomingCall> =
                state.backlog.drain().flat_map(|(_, calls)| calls).collect();
            (armed, delivered, active, backlog)
        };

        for call in backlog {
            let _ = call.reply.send(Outbound::Error {
                id: call.request_id,
                status: shutting_down(),
            });
        }
        for (tag, call) in delivered {
            let _ = call.reply.send(Outbound::Error {
                id: call.request_id,
                status: shutting_down(),
            });
            self.completions.push(tag, false);
        }
        for (tag, call) in active {
            let _ = call.reply.send(Outbound::Error {
                id: call.request_id,
                status: shutting_down(),
            });
            self.completions.push(tag, false);
        }
        for tag in armed {
            self.completions.push(tag, false);
        }
        warn!("transport shut down");
    }
}

fn shutting_down() -> Status {
    lantern_core::Error::Cancelled("server is shutting down".into()).into()
}
