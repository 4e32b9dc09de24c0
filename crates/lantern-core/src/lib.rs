//! Lantern Core - identity, queries and the host graph contract
//!
//! This crate holds the vocabulary every other Lantern crate speaks:
//! stable node identifiers, attribute-map queries that describe a node,
//! the `HostGraph` trait a live object tree implements, and the searcher
//! that turns nodes into queries and queries back into nodes.
//!
//! # Example
//!
//! ```no_run
//! use lantern_core::{Query, Searcher};
//!
//! let searcher = Searcher::new();
//! let query = Query::by_type("Button").with("path", "Window/.*/OK");
//! // let matches = searcher.resolve(&graph, &query)?;
//! ```

mod error;
mod graph;
mod node;
mod query;
pub mod search;

pub use error::{Error, Result};
pub use graph::{order_index, walk_breadth_first, HostGraph, MethodInfo, ParameterInfo};
pub use node::NodeId;
pub use query::{Query, Value};
pub use search::{PropertyRegistry, Searcher, Strategy};

#[cfg(test)]
mod testing;
