use thiserror::Error;

use crate::id::NodeId;
use crate::key::KeyParseError;

/// Errors shared across crates that don't warrant their own error type.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid key: {0}")]
    InvalidKey(#[from] KeyParseError),

    #[error("node {0} not found")]
    NodeNotFound(NodeId),
}
