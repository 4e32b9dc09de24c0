//! Per-call state machines.
//!
//! Each in-flight call is an object with an explicit phase. The completion
//! dispatcher looks the call up by tag and calls `advance(ok)` on the owner
//! thread; the call does the work for its current phase, starts the next
//! asynchronous step on the transport, and moves on.
//!
//! ```text
//! unary:   Created ──▶ Processing ──▶ Finished ──▶ (dropped)
//! stream:  Created ──▶ Processing ──▶ Streaming ⟲ ──▶ Finished ──▶ (dropped)
//! ```
//!
//! On entering `Processing` a call first arms a fresh sibling for the same
//! method, so exactly one instance is always waiting for the next request.
//! A completion with `ok == false` ends the call from any phase.

use crate::completion::{CompletionSender, Tag};
use crate::protocol::Status;
use crate::transport::Transport;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// Lifecycle phase of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Created,
    Processing,
    Streaming,
    Finished,
}

/// What the registry should do with a call after advancing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Waiting for another completion.
    Continue,
    /// The call is over and can be dropped.
    Done,
}

/// Owner-thread state that calls run against.
pub trait CallHost: Sized + 'static {
    fn transport(&self) -> &Transport;
    fn calls(&mut self) -> &mut CallRegistry<Self>;
}

/// A call the registry can drive.
pub trait Callable<C>: 'static {
    fn tag(&self) -> Tag;
    fn phase(&self) -> Phase;
    fn method(&self) -> &'static str;
    fn advance(&mut self, ok: bool, cx: &mut C) -> Flow;
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Business logic of a one-request, one-response method.
pub trait UnaryHandler: Default + 'static {
    const METHOD: &'static str;
    type Context: CallHost;
    type Request: DeserializeOwned;
    type Response: Serialize;

    fn process(
        &self,
        cx: &mut Self::Context,
        request: Self::Request,
    ) -> Result<Self::Response, Status>;
}

/// Next step of a stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem<T> {
    /// Send one item and stay open.
    Message(T),
    /// End the stream.
    Finish(Status),
}

/// Business logic of a server-streaming method.
///
/// A fresh handler is created per call with `Default`, so per-call state
/// (an observer registration, a channel) lives in the handler itself.
pub trait StreamHandler: Default + 'static {
    const METHOD: &'static str;
    type Context: CallHost;
    type Request: DeserializeOwned + 'static;
    type Item: Serialize;

    /// Produces the next item, or `None` when there is nothing to send yet.
    fn process(
        &mut self,
        cx: &mut Self::Context,
        request: &Self::Request,
    ) -> Option<StreamItem<Self::Item>>;

    /// Called after `process` returned `None`. The handler must arrange for
    /// `waker.wake()` to be called once more data is available.
    fn arm_wakeup(&mut self, cx: &mut Self::Context, waker: CompletionWaker);

    /// Releases per-call resources. Runs exactly once for every call that
    /// received a request, however it ended.
    fn on_finish(&mut self, _cx: &mut Self::Context) {}
}

/// Re-enqueues a parked stream on the completion queue.
#[derive(Clone)]
pub struct CompletionWaker {
    tag: Tag,
    completions: CompletionSender,
}

impl CompletionWaker {
    pub fn new(tag: Tag, completions: CompletionSender) -> Self {
        Self { tag, completions }
    }

    pub fn wake(&self) {
        self.completions.push(self.tag, true);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Unary calls
// ─────────────────────────────────────────────────────────────────────────────

/// One instance of a unary method.
pub struct CallState<H> {
    tag: Tag,
    phase: Phase,
    handler: H,
}

impl<H: UnaryHandler> CallState<H> {
    pub fn new() -> Self {
        Self {
            tag: Tag::next(),
            phase: Phase::Created,
            handler: H::default(),
        }
    }

    fn respond(&self, cx: &mut H::Context, params: serde_json::Value) {
        let result = serde_json::from_value::<H::Request>(params)
            .map_err(|e| Status::invalid_argument(e.to_string()))
            .and_then(|request| self.handler.process(cx, request))
            .and_then(|response| {
                serde_json::to_value(response).map_err(|e| Status::internal(e.to_string()))
            });
        match result {
            Ok(value) => cx.transport().finish(self.tag, value),
            Err(status) => {
                debug!("{} {} failed: {}", H::METHOD, self.tag, status);
                cx.transport().finish_with_error(self.tag, status)
            }
        }
    }
}

impl<H: UnaryHandler> Default for CallState<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: UnaryHandler> Callable<H::Context> for CallState<H> {
    fn tag(&self) -> Tag {
        self.tag
    }

    fn phase(&self) -> Phase {
        self.phase
    }

    fn method(&self) -> &'static str {
        H::METHOD
    }

    fn advance(&mut self, ok: bool, cx: &mut H::Context) -> Flow {
        if !ok {
            self.phase = Phase::Finished;
            return Flow::Done;
        }
        match self.phase {
            Phase::Created => {
                cx.transport().request_call(H::METHOD, self.tag);
                self.phase = Phase::Processing;
                Flow::Continue
            }
            Phase::Processing => {
                arm_call(cx, Box::new(CallState::<H>::new()));
                self.phase = Phase::Finished;
                match cx.transport().take_request(self.tag) {
                    Some(params) => {
                        self.respond(cx, params);
                        Flow::Continue
                    }
                    None => Flow::Done,
                }
            }
            Phase::Streaming | Phase::Finished => Flow::Done,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Streaming calls
// ─────────────────────────────────────────────────────────────────────────────

/// One instance of a server-streaming method.
pub struct StreamCallState<H: StreamHandler> {
    tag: Tag,
    phase: Phase,
    request: Option<H::Request>,
    handler: H,
}

impl<H: StreamHandler> StreamCallState<H> {
    pub fn new() -> Self {
        Self {
            tag: Tag::next(),
            phase: Phase::Created,
            request: None,
            handler: H::default(),
        }
    }

    /// Moves to `Finished`, running the handler cleanup if a request was
    /// ever taken.
    fn finish(&mut self, cx: &mut H::Context) {
        if self.phase != Phase::Finished && self.request.is_some() {
            self.handler.on_finish(cx);
        }
        self.phase = Phase::Finished;
    }

    fn pump(&mut self, cx: &mut H::Context) -> Flow {
        let Some(request) = self.request.as_ref() else {
            self.phase = Phase::Finished;
            return Flow::Done;
        };
        match self.handler.process(cx, request) {
            None => {
                let waker = CompletionWaker::new(self.tag, cx.transport().completions().clone());
                self.handler.arm_wakeup(cx, waker);
            }
            Some(StreamItem::Message(item)) => match serde_json::to_value(item) {
                Ok(value) => cx.transport().write(self.tag, value),
                Err(e) => {
                    cx.transport()
                        .finish_stream(self.tag, Status::internal(e.to_string()));
                    self.finish(cx);
                }
            },
            Some(StreamItem::Finish(status)) => {
                debug!("{} {} finished: {}", H::METHOD, self.tag, status);
                cx.transport().finish_stream(self.tag, status);
                self.finish(cx);
            }
        }
        Flow::Continue
    }
}

impl<H: StreamHandler> Default for StreamCallState<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: StreamHandler> Callable<H::Context> for StreamCallState<H> {
    fn tag(&self) -> Tag {
        self.tag
    }

    fn phase(&self) -> Phase {
        self.phase
    }

    fn method(&self) -> &'static str {
        H::METHOD
    }

    fn advance(&mut self, ok: bool, cx: &mut H::Context) -> Flow {
        if !ok {
            debug!("{} {} ended by transport", H::METHOD, self.tag);
            self.finish(cx);
            return Flow::Done;
        }
        match self.phase {
            Phase::Created => {
                cx.transport().request_call(H::METHOD, self.tag);
                self.phase = Phase::Processing;
                Flow::Continue
            }
            Phase::Processing => {
                arm_call(cx, Box::new(StreamCallState::<H>::new()));
                let Some(params) = cx.transport().take_request(self.tag) else {
                    self.phase = Phase::Finished;
                    return Flow::Done;
                };
                match serde_json::from_value::<H::Request>(params) {
                    Ok(request) => {
                        self.request = Some(request);
                        self.phase = Phase::Streaming;
                        self.pump(cx)
                    }
                    Err(e) => {
                        cx.transport()
                            .finish_stream(self.tag, Status::invalid_argument(e.to_string()));
                        self.phase = Phase::Finished;
                        Flow::Continue
                    }
                }
            }
            Phase::Streaming => self.pump(cx),
            Phase::Finished => Flow::Done,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Live calls, keyed by tag.
pub struct CallRegistry<C> {
    calls: HashMap<Tag, Box<dyn Callable<C>>>,
}

impl<C: 'static> Default for CallRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: 'static> CallRegistry<C> {
    pub fn new() -> Self {
        Self {
            calls: HashMap::new(),
        }
    }

    pub fn insert(&mut self, call: Box<dyn Callable<C>>) {
        self.calls.insert(call.tag(), call);
    }

    pub fn take(&mut self, tag: Tag) -> Option<Box<dyn Callable<C>>> {
        self.calls.remove(&tag)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Number of live calls of `method` in `phase`.
    pub fn count(&self, method: &str, phase: Phase) -> usize {
        self.calls
            .values()
            .filter(|c| c.method() == method && c.phase() == phase)
            .count()
    }
}

/// Advances a new call out of `Created` and registers it.
pub fn arm_call<C: CallHost>(cx: &mut C, mut call: Box<dyn Callable<C>>) {
    if call.advance(true, cx) == Flow::Continue {
        cx.calls().insert(call);
    }
}

/// Handles one completion: resolves the tag and advances its call.
///
/// Completions for calls that are already gone are ignored.
pub fn dispatch<C: CallHost>(cx: &mut C, tag: Tag, ok: bool) {
    let Some(mut call) = cx.calls().take(tag) else {
        debug!("completion for unknown call {} ignored", tag);
        return;
    };
    match call.advance(ok, cx) {
        Flow::Continue => cx.calls().insert(call),
        Flow::Done => debug!("{} {} released", call.method(), tag),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{completion_queue, CompletionQueue};
    use crate::protocol::{Outbound, StatusCode};
    use crate::transport::IncomingCall;
    use serde_json::{json, Value};
    use tokio::sync::mpsc;
    use uuid::Uuid;

    struct EchoHost {
        transport: Transport,
        calls: CallRegistry<EchoHost>,
    }

    impl CallHost for EchoHost {
        fn transport(&self) -> &Transport {
            &self.transport
        }

        fn calls(&mut self) -> &mut CallRegistry<Self> {
            &mut self.calls
        }
    }

    #[derive(Default)]
    struct Echo;

    impl UnaryHandler for Echo {
        const METHOD: &'static str = "test.echo";
        type Context = EchoHost;
        type Request = Value;
        type Response = Value;

        fn process(&self, _cx: &mut EchoHost, request: Value) -> Result<Value, Status> {
            if request.get("fail").is_some() {
                return Err(Status::invalid_argument("asked to fail"));
            }
            Ok(request)
        }
    }

    fn echo_host() -> (EchoHost, CompletionQueue) {
        let (completions, queue) = completion_queue();
        let transport = Transport::new(completions);
        transport.register_method(Echo::METHOD);
        let host = EchoHost {
            transport,
            calls: CallRegistry::new(),
        };
        (host, queue)
    }

    fn drain(host: &mut EchoHost, queue: &mut CompletionQueue) {
        while let Some((tag, ok)) = queue.try_next() {
            dispatch(host, tag, ok);
        }
    }

    fn send(host: &EchoHost, id: i64, params: Value, reply: &mpsc::UnboundedSender<Outbound>) {
        host.transport.deliver(IncomingCall {
            connection: Uuid::nil(),
            request_id: json!(id),
            method: Echo::METHOD.to_string(),
            params,
            reply: reply.clone(),
        });
    }

    #[test]
    fn test_unary_call_rearms_after_each_request() {
        let (mut host, mut queue) = echo_host();
        arm_call(&mut host, Box::new(CallState::<Echo>::new()));
        assert_eq!(host.calls.count(Echo::METHOD, Phase::Processing), 1);

        let (reply, mut replies) = mpsc::unbounded_channel();
        for id in 1..=3 {
            send(&host, id, json!({ "n": id }), &reply);
            drain(&mut host, &mut queue);
        }

        for id in 1..=3 {
            match replies.try_recv().unwrap() {
                Outbound::Result { id: got, result } => {
                    assert_eq!(got, json!(id));
                    assert_eq!(result, json!({ "n": id }));
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(host.calls.len(), 1);
        assert_eq!(host.calls.count(Echo::METHOD, Phase::Processing), 1);
        assert_eq!(host.transport.armed(Echo::METHOD), 1);
    }

    #[test]
    fn test_handler_error_and_failed_completion() {
        let (mut host, mut queue) = echo_host();
        arm_call(&mut host, Box::new(CallState::<Echo>::new()));

        let (reply, mut replies) = mpsc::unbounded_channel();
        send(&host, 7, json!({ "fail": true }), &reply);
        drain(&mut host, &mut queue);
        match replies.try_recv().unwrap() {
            Outbound::Error { id, status } => {
                assert_eq!(id, json!(7));
                assert_eq!(status.code, StatusCode::InvalidArgument);
            }
            other => panic!("unexpected {other:?}"),
        }

        // The armed sibling completes with ok = false and is dropped.
        host.transport.shutdown();
        drain(&mut host, &mut queue);
        assert!(host.calls.is_empty());
    }
}
