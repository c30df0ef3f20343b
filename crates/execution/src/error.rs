//! Planning errors.

use nebula_core::id::{DefinitionId, NodeId};
use thiserror::Error;

/// Errors raised while turning `(nodes, connections)` into a [`crate::Plan`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    /// The pure-data dependency graph contains a cycle. Execution edges may
    /// loop (that's how loop nodes work); data edges may not.
    #[error("data dependency cycle detected, involving node {0}")]
    DataCycle(NodeId),

    /// A node references a definition the registry doesn't know about.
    #[error("unknown definition: {0}")]
    UnknownDefinition(DefinitionId),

    /// Two nodes in the same graph (or the same group) share an id.
    #[error("duplicate node id: {0}")]
    DuplicateNodeId(NodeId),
}
