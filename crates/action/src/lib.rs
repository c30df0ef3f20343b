//! # Nebula Action
//!
//! The node executor contract: the [`Executor`] trait a node body
//! implements, the [`ExecContext`] it runs against, and the error and
//! signal-tracking types that cross that boundary.
//!
//! This crate defines what a node body is and how it talks to the engine —
//! not how the engine resolves sockets, schedules execution edges, or
//! manages scopes. Those live in `nebula-engine`, which implements
//! `ExecContext` against its own storage and scheduler.
//!
//! ```rust,ignore
//! use nebula_action::{ExecContext, ExecContextExt, Executor, NodeError};
//! use async_trait::async_trait;
//! use tokio_util::sync::CancellationToken;
//!
//! struct Add;
//!
//! #[async_trait]
//! impl Executor for Add {
//!     async fn execute(&self, ctx: &dyn ExecContext, _cancel: CancellationToken) -> Result<(), NodeError> {
//!         let a: i64 = ctx.input("a").await?;
//!         let b: i64 = ctx.input("b").await?;
//!         ctx.set_output("sum", &(a + b)).await?;
//!         ctx.trigger("exec_out");
//!         Ok(())
//!     }
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Runtime context exposed to a node body during execution.
pub mod context;
/// Error type surfaced by a node body.
pub mod error;
/// The `Executor` trait — a node body's shape.
pub mod executor;
/// Execution-output signal tracking and streaming modes.
pub mod result;

pub use context::{ExecContext, ExecContextExt};
pub use error::NodeError;
pub use executor::Executor;
pub use result::{ExecSignals, StreamMode};

/// Result alias for fallible operations in terms of [`NodeError`].
pub type Result<T> = std::result::Result<T, NodeError>;

/// Common prelude for crates implementing or invoking node bodies.
pub mod prelude {
    pub use super::{
        ExecContext, ExecContextExt, ExecSignals, Executor, NodeError, Result, StreamMode,
    };
}
