//! Lantern Watcher - change detection for live object trees
//!
//! Host graphs do not announce their own structural changes, so Lantern
//! polls them. On every tick of the owner thread each observer diffs the
//! live graph against its cache and pushes the differences into an
//! `EventChannel`, where a streaming call picks them up.
//!
//! - `GraphDiffObserver` reports nodes added, removed, renamed, reparented
//! - `PropertyObserver` reports property changes on a single node
//! - `EventChannel` carries events across the thread boundary

mod channel;
mod event;
mod observer;
mod property;

pub use channel::{ChangeEventChannel, EventChannel, PropertyEventChannel};
pub use event::{ChangeEvent, PropertyEvent};
pub use observer::{GraphDiffObserver, TrackedNode};
pub use property::PropertyObserver;
