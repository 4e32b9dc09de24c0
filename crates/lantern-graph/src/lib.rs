//! Lantern Graph - an in-memory host graph
//!
//! This crate provides `ObjectTree`, a petgraph-backed tree of typed objects
//! with named properties that implements `lantern_core::HostGraph`. It is
//! what `lantern serve` exposes, and what the tests of the observer and
//! server crates mutate.
//!
//! # Example
//!
//! ```no_run
//! use lantern_graph::{NodeSpec, TreeBuilder};
//!
//! let tree = TreeBuilder::new()
//!     .root(NodeSpec::new("Window").named("Main").child(NodeSpec::new("Button").named("ok")))
//!     .build()
//!     .unwrap();
//! ```

mod builder;
mod edge;
mod error;
mod graph;
mod method;

pub use builder::{NodeSpec, TreeBuilder};
pub use edge::{ChildLink, ObjectData, PropertySlot};
pub use error::TreeError;
pub use graph::ObjectTree;
pub use method::MethodHandler;
