use thiserror::Error;

use super::node::NodeId;

/// Errors that can occur during B+ tree operations
///
/// Missing keys and duplicate inserts are not errors. `NodeNotFound` and
/// `InvalidState` mean the node graph is inconsistent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BPlusTreeError {
    #[error("Invalid order: {0} (must be >= 3)")]
    InvalidOrder(usize),

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Invalid tree state: {0}")]
    InvalidState(String),
}

pub type BPlusTreeResult<T> = Result<T, BPlusTreeError>;
