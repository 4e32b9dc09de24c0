//! Error taxonomy shared by the query service and the host graph.

use thiserror::Error;

/// Errors that can occur while resolving or mutating host graph nodes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Nothing in the graph matched.
    #[error("no object matches {0}")]
    NotFound(String),

    /// A single node was required but several matched.
    #[error("query {query} matches {count} objects, expected one")]
    Ambiguous { query: String, count: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The call was abandoned before it produced a result.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Unrecoverable failure, such as a transport that cannot bind.
    #[error("fatal: {0}")]
    Fatal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
