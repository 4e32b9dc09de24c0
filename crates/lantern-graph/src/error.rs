use lantern_core::NodeId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TreeError {
    #[error("unknown object {0}")]
    UnknownNode(NodeId),

    #[error("cannot move {node} under {parent}: it would become its own ancestor")]
    Cycle { node: NodeId, parent: NodeId },

    #[error("fixture I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("fixture parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<TreeError> for lantern_core::Error {
    fn from(e: TreeError) -> Self {
        match e {
            TreeError::UnknownNode(id) => lantern_core::Error::NotFound(id.to_string()),
            other => lantern_core::Error::InvalidArgument(other.to_string()),
        }
    }
}
