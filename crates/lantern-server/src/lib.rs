//! Lantern Server - async RPC front end for a live host graph
//!
//! This crate serves the object and observer methods over WebSocket
//! JSON-RPC. Every call runs as a small state machine keyed by a tag:
//!
//! - The transport matches incoming requests to armed calls and posts a
//!   completion for each one.
//! - A dispatcher thread drains the completion queue and forwards every
//!   completion to the owner thread.
//! - The owner thread holds the host graph and all call state, advances
//!   calls, and ticks the change observers on a fixed interval.

mod call;
mod completion;
mod config;
mod context;
mod dispatcher;
mod error;
mod owner;
mod protocol;
mod server;
pub mod services;
mod transport;

pub use call::{
    arm_call, dispatch, CallHost, CallRegistry, CallState, Callable, CompletionWaker, Flow, Phase,
    StreamCallState, StreamHandler, StreamItem, UnaryHandler,
};
pub use completion::{completion_queue, CompletionQueue, CompletionSender, Tag};
pub use config::{ObserveConfig, ServerConfig, DEFAULT_PORT, HOST_VAR, POLL_VAR, PORT_VAR};
pub use context::{HostContext, ObserverId, ObserverRegistry};
pub use dispatcher::CompletionDispatcher;
pub use error::{ConfigError, OwnerError, ServerError};
pub use owner::{OwnerContext, OwnerHandle, OwnerThread};
pub use protocol::{
    Notification, Outbound, Request, Response, RpcError, Status, StatusCode, CANCEL,
    FAILED_PRECONDITION, INTERNAL_ERROR, INVALID_PARAMS, METHOD_NOT_FOUND, NOT_FOUND,
    PARSE_ERROR, REQUEST_CANCELLED, STREAM_ITEM,
};
pub use server::Server;
pub use transport::{ConnectionId, IncomingCall, ReplySink, Transport};
