use nebula_value::ValueError;
use thiserror::Error;

/// Error surfaced by a node body during execution.
///
/// Wrapped by the engine as `ExecError::Node(node_id, cause)` — this type
/// itself carries no node identity, since the engine already knows which
/// node it invoked.
#[derive(Debug, Error)]
pub enum NodeError {
    /// The node body failed for a reason of its own; `message` is shown to
    /// the caller as-is.
    #[error("{message}")]
    Fatal { message: String },

    /// Execution was cancelled while the node body was running.
    #[error("cancelled")]
    Cancelled,

    /// A data input failed to decode as the type the node body requested.
    #[error("input socket '{socket}' failed to decode: {source}")]
    InputDecode {
        socket: String,
        #[source]
        source: ValueError,
    },

    /// A data output failed to encode.
    #[error("output socket '{socket}' failed to encode: {source}")]
    OutputEncode {
        socket: String,
        #[source]
        source: ValueError,
    },
}

impl NodeError {
    /// Build a [`NodeError::Fatal`] from any displayable message.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    /// Whether this error represents cooperative cancellation rather than
    /// a genuine node failure.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
