use async_trait::async_trait;
use nebula_core::id::NodeId;
use nebula_value::{SocketValue, TypedValue};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::error::NodeError;

/// Runtime context handed to a node body during execution.
///
/// An executor is `(ctx, cancel) -> future<()>`: the body reads its inputs
/// and writes its outputs through `ctx`, signals which execution edges to
/// follow next via [`trigger`](Self::trigger), and streams items via
/// [`emit`](Self::emit). The concrete implementation lives in the engine,
/// which knows how to resolve a socket against storage and how to schedule
/// signalled execution edges — this crate only defines the contract.
///
/// Object-safe by construction: methods work in terms of the boxed
/// [`SocketValue`] rather than a generic type parameter. [`ExecContextExt`]
/// layers typed convenience methods on top via a blanket implementation.
#[async_trait]
pub trait ExecContext: Send + Sync {
    /// The node this context was constructed for.
    fn node_id(&self) -> NodeId;

    /// The cancellation token propagated to this node body.
    fn cancel_token(&self) -> &CancellationToken;

    /// Scope-depth counter: incremented on entry to a nested scope (loop
    /// iteration, group execution) and restored on exit.
    fn generation(&self) -> u64;

    /// Pull a data input by socket name from storage.
    async fn input_value(&self, socket: &str) -> Result<SocketValue, NodeError>;

    /// Write a data output by socket name to storage.
    async fn set_output_value(&self, socket: &str, value: SocketValue) -> Result<(), NodeError>;

    /// Signal an execution-output socket. One-shot per invocation:
    /// signalling the same socket more than once is idempotent.
    fn trigger(&self, exec_output: &str);

    /// Stream one item on `item_socket`. Implicitly signals that socket's
    /// `on_item` execution output. In `Sequential` stream mode this awaits
    /// full downstream execution of the item before returning; in
    /// `FireAndForget` mode it returns immediately.
    async fn emit(&self, item_socket: &str, value: SocketValue) -> Result<(), NodeError>;

    /// Read a variable from the current storage scope.
    fn get_variable(&self, key: &str) -> Option<SocketValue>;

    /// Write a variable to the current storage scope.
    fn set_variable(&self, key: &str, value: SocketValue);

    /// Emit an observational feedback event on the event bus. Feedback
    /// never affects control flow — subscribers may only observe it.
    fn emit_feedback(&self, message: &str);

    /// Returns [`NodeError::Cancelled`] if this invocation's token has
    /// already fired. Node bodies should call this in loops and before
    /// expensive work to support cooperative cancellation.
    fn check_cancelled(&self) -> Result<(), NodeError> {
        if self.cancel_token().is_cancelled() {
            Err(NodeError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Typed sugar over [`ExecContext`]'s boxed-value methods.
///
/// Blanket-implemented for every `ExecContext`; node bodies import this
/// trait alongside `ExecContext` to get `input`/`set_output` without
/// juggling [`SocketValue`] directly.
#[async_trait]
pub trait ExecContextExt: ExecContext {
    /// Pull and decode a data input as `T`.
    async fn input<T>(&self, socket: &str) -> Result<T, NodeError>
    where
        T: TypedValue + DeserializeOwned + Default,
    {
        let boxed = self.input_value(socket).await?;
        boxed.to_value().map_err(|source| NodeError::InputDecode {
            socket: socket.to_string(),
            source,
        })
    }

    /// Encode and write a data output from `T`.
    async fn set_output<T>(&self, socket: &str, value: &T) -> Result<(), NodeError>
    where
        T: TypedValue + Sync,
    {
        let boxed = SocketValue::from_value(value).map_err(|source| NodeError::OutputEncode {
            socket: socket.to_string(),
            source,
        })?;
        self.set_output_value(socket, boxed).await
    }
}

impl<C: ExecContext + ?Sized> ExecContextExt for C {}
