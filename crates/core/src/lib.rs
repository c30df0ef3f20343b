//! # Nebula Core
//!
//! Identifiers and error types shared by every crate in the graph engine.
//!
//! - **Identifiers**: [`NodeId`], [`ConnectionId`], [`ExecutionId`], [`GroupId`],
//!   [`DefinitionId`], [`JobId`] — each a distinct, non-interchangeable UUID type.
//! - **[`Key`]**: the normalized string identifier used for definition ids and
//!   registry categories.
//!
//! ```rust
//! use nebula_core::{NodeId, ExecutionId};
//!
//! let execution_id = ExecutionId::v4();
//! let node_id = NodeId::v4();
//! assert_ne!(execution_id.to_string(), node_id.to_string());
//! ```

pub mod error;
pub mod id;
pub mod key;

pub use error::CoreError;
pub use id::*;
pub use key::{Key, KeyParseError};

/// Result type used throughout Nebula crates that don't need their own error type.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Common prelude for Nebula crates.
pub mod prelude {
    pub use super::{
        ConnectionId, CoreError, DefinitionId, ExecutionId, GroupId, JobId, Key, KeyParseError,
        NodeId, Result, UuidParseError,
    };
}
