//! `Start`, `Branch`, `Marker`, `Delay` — the non-looping control and debug
//! vocabulary.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use nebula_action::{ExecContext, ExecContextExt, Executor, NodeError};
use nebula_core::Key;
use nebula_node::definition::EXIT;
use nebula_node::{NodeDefinition, Socket};
use nebula_value::SocketValue;
use tokio_util::sync::CancellationToken;

fn category() -> Key {
    Key::new("control").expect("static category name")
}

/// Begins an execution chain with nothing upstream of it.
struct Start;

#[async_trait]
impl Executor for Start {
    async fn execute(&self, ctx: &dyn ExecContext, _cancel: CancellationToken) -> Result<(), NodeError> {
        ctx.trigger(EXIT);
        Ok(())
    }
}

#[must_use]
pub fn start_definition() -> NodeDefinition {
    NodeDefinition::builder("Start", category(), "begins an execution chain")
        .execution_initiator()
        .executor(Arc::new(Start))
        .build()
}

/// Signals `true_branch` or `false_branch` depending on `condition`. Only
/// the signalled branch's downstream subgraph runs.
struct Branch;

#[async_trait]
impl Executor for Branch {
    async fn execute(&self, ctx: &dyn ExecContext, _cancel: CancellationToken) -> Result<(), NodeError> {
        let condition: bool = ctx.input("condition").await?;
        ctx.trigger(if condition { "true_branch" } else { "false_branch" });
        Ok(())
    }
}

#[must_use]
pub fn branch_definition() -> NodeDefinition {
    NodeDefinition::builder("Branch", category(), "branches on a boolean condition")
        .callable()
        .input(Socket::data_input("condition", "bool").with_default(SocketValue::from_value(&false).unwrap()))
        .output(Socket::exec_output("true_branch"))
        .output(Socket::exec_output("false_branch"))
        .executor(Arc::new(Branch))
        .build()
}

/// A no-op execution pass-through that records its own invocation count and
/// the scope depth it ran at, purely for test/debug observation.
pub struct Marker {
    invocations: AtomicU64,
}

impl Marker {
    #[must_use]
    pub fn new() -> Self {
        Self { invocations: AtomicU64::new(0) }
    }

    /// How many times this marker has fired since construction. All nodes
    /// stamped from the same `NodeDefinition` share one `Marker` instance
    /// (the executor is cloned by `Arc`, not by value), so this counts
    /// invocations across every placed copy of the definition.
    #[must_use]
    pub fn invocation_count(&self) -> u64 {
        self.invocations.load(Ordering::SeqCst)
    }
}

impl Default for Marker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for Marker {
    async fn execute(&self, ctx: &dyn ExecContext, _cancel: CancellationToken) -> Result<(), NodeError> {
        let count = self.invocations.fetch_add(1, Ordering::SeqCst) + 1;
        ctx.emit_feedback(&format!("marker invocation {count} at generation {}", ctx.generation()));
        ctx.trigger(EXIT);
        Ok(())
    }
}

#[must_use]
pub fn marker_definition() -> NodeDefinition {
    NodeDefinition::builder("Marker", category(), "no-op pass-through recording its own invocations")
        .callable()
        .executor(Arc::new(Marker::new()))
        .build()
}

/// Awaits a cancellable timer, then triggers `exit`. `duration_ms` is read
/// per invocation so a placed instance's own socket default (or an upstream
/// connection) configures how long it waits.
struct Delay;

#[async_trait]
impl Executor for Delay {
    async fn execute(&self, ctx: &dyn ExecContext, cancel: CancellationToken) -> Result<(), NodeError> {
        let duration_ms: i64 = ctx.input("duration_ms").await?;
        let duration = Duration::from_millis(duration_ms.max(0) as u64);
        tokio::select! {
            () = tokio::time::sleep(duration) => {}
            () = cancel.cancelled() => return Err(NodeError::Cancelled),
        }
        ctx.trigger(EXIT);
        Ok(())
    }
}

#[must_use]
pub fn delay_definition() -> NodeDefinition {
    NodeDefinition::builder("Delay", category(), "waits a configured duration before continuing")
        .execution_initiator()
        .input(Socket::data_input("duration_ms", "int").with_default(SocketValue::from_value(&0_i64).unwrap()))
        .executor(Arc::new(Delay))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::RwLock;
    use std::collections::HashMap;

    struct TestContext {
        node_id: nebula_core::id::NodeId,
        cancel: CancellationToken,
        inputs: RwLock<HashMap<String, SocketValue>>,
        triggered: RwLock<Vec<String>>,
    }

    impl TestContext {
        fn with_input(socket: &str, value: SocketValue) -> Self {
            let mut inputs = HashMap::new();
            inputs.insert(socket.to_string(), value);
            Self {
                node_id: nebula_core::id::NodeId::v4(),
                cancel: CancellationToken::new(),
                inputs: RwLock::new(inputs),
                triggered: RwLock::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ExecContext for TestContext {
        fn node_id(&self) -> nebula_core::id::NodeId {
            self.node_id
        }
        fn cancel_token(&self) -> &CancellationToken {
            &self.cancel
        }
        fn generation(&self) -> u64 {
            0
        }
        async fn input_value(&self, socket: &str) -> Result<SocketValue, NodeError> {
            Ok(self.inputs.read().get(socket).cloned().unwrap_or_default())
        }
        async fn set_output_value(&self, _socket: &str, _value: SocketValue) -> Result<(), NodeError> {
            Ok(())
        }
        fn trigger(&self, exec_output: &str) {
            self.triggered.write().push(exec_output.to_string());
        }
        async fn emit(&self, _item_socket: &str, _value: SocketValue) -> Result<(), NodeError> {
            Ok(())
        }
        fn get_variable(&self, _key: &str) -> Option<SocketValue> {
            None
        }
        fn set_variable(&self, _key: &str, _value: SocketValue) {}
        fn emit_feedback(&self, _message: &str) {}
    }

    #[tokio::test]
    async fn branch_triggers_true_branch_on_true_condition() {
        let ctx = TestContext::with_input("condition", SocketValue::from_value(&true).unwrap());
        Branch.execute(&ctx, CancellationToken::new()).await.unwrap();
        assert_eq!(ctx.triggered.read().as_slice(), ["true_branch"]);
    }

    #[tokio::test]
    async fn branch_triggers_false_branch_on_false_condition() {
        let ctx = TestContext::with_input("condition", SocketValue::from_value(&false).unwrap());
        Branch.execute(&ctx, CancellationToken::new()).await.unwrap();
        assert_eq!(ctx.triggered.read().as_slice(), ["false_branch"]);
    }

    #[tokio::test]
    async fn marker_counts_invocations_across_calls() {
        let marker = Marker::new();
        let ctx = TestContext::with_input("unused", SocketValue::null());
        marker.execute(&ctx, CancellationToken::new()).await.unwrap();
        marker.execute(&ctx, CancellationToken::new()).await.unwrap();
        assert_eq!(marker.invocation_count(), 2);
    }

    #[tokio::test]
    async fn delay_honours_zero_duration_and_triggers_exit() {
        let ctx = TestContext::with_input("duration_ms", SocketValue::from_value(&0_i64).unwrap());
        Delay.execute(&ctx, CancellationToken::new()).await.unwrap();
        assert_eq!(ctx.triggered.read().as_slice(), [EXIT]);
    }

    #[tokio::test]
    async fn delay_returns_cancelled_when_token_fires_first() {
        let ctx = TestContext::with_input("duration_ms", SocketValue::from_value(&60_000_i64).unwrap());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = Delay.execute(&ctx, cancel).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
