use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::context::ExecContext;
use crate::error::NodeError;

/// The body of a node: `(ctx, cancel) -> future<()>`.
///
/// A node body reads its inputs and writes its outputs through `ctx`,
/// signals execution outputs via `ctx.trigger`/`ctx.emit`, and returns
/// `Ok(())` on success. The engine inspects which execution outputs were
/// signalled during the call — not the return value — to decide which
/// execution edges to follow next.
///
/// `cancel` and `ctx.cancel_token()` refer to the same token; it is passed
/// separately so a body can `tokio::select!` against it directly without
/// going through `ctx`.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run this node's body once.
    async fn execute(&self, ctx: &dyn ExecContext, cancel: CancellationToken) -> Result<(), NodeError>;
}
