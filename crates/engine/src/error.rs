//! Engine error types.

use nebula_action::NodeError;
use nebula_core::id::NodeId;
use nebula_execution::PlanError;
use thiserror::Error;

/// Errors surfaced by `execute`/`execute_group`.
#[derive(Debug, Error)]
pub enum ExecError {
    /// Planning failed before any node ran.
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// A node body returned an error. Scheduling along the failing
    /// execution chain stops; in `Parallel` mode already-running siblings
    /// are cancelled via the shared token.
    #[error("node {0} failed: {1}")]
    Node(NodeId, #[source] NodeError),

    /// An input failed to decode as the type the node body expected.
    #[error("type mismatch resolving input on node {0}: {1}")]
    Type(NodeId, String),

    /// The run was cancelled.
    #[error("execution cancelled")]
    Cancelled,
}

impl ExecError {
    /// Whether this is (or wraps) a cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled) || matches!(self, Self::Node(_, e) if e.is_cancelled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_error_display_includes_id() {
        let id = NodeId::v4();
        let err = ExecError::Node(id, NodeError::fatal("boom"));
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn cancelled_is_detected_directly() {
        assert!(ExecError::Cancelled.is_cancelled());
    }

    #[test]
    fn cancelled_is_detected_through_node_error() {
        let err = ExecError::Node(NodeId::v4(), NodeError::Cancelled);
        assert!(err.is_cancelled());
    }

    #[test]
    fn plan_error_converts_via_from() {
        let id = NodeId::v4();
        let err: ExecError = PlanError::DataCycle(id).into();
        assert!(matches!(err, ExecError::Plan(PlanError::DataCycle(_))));
    }
}
