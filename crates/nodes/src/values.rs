//! `Const`, `Add`, `Consume` — the minimal arithmetic/data-sink vocabulary
//! the end-to-end data pipeline scenario exercises.

use std::sync::Arc;

use async_trait::async_trait;
use nebula_action::{ExecContext, ExecContextExt, Executor, NodeError};
use nebula_core::Key;
use nebula_node::{NodeDefinition, Socket};
use nebula_value::SocketValue;
use tokio_util::sync::CancellationToken;

fn category() -> Key {
    Key::new("values").expect("static category name")
}

/// A zero-input data producer: its `value` input's per-instance default (set
/// on the placed `NodeData`, not the shared definition) is its literal.
/// Copying `value` straight through lets it sit inline in a chain — connect
/// it upstream of anything and it behaves as a pass-through constant too.
struct Const;

#[async_trait]
impl Executor for Const {
    async fn execute(&self, ctx: &dyn ExecContext, _cancel: CancellationToken) -> Result<(), NodeError> {
        let value = ctx.input_value("value").await?;
        ctx.set_output_value("value", value).await?;
        ctx.trigger(nebula_node::definition::EXIT);
        Ok(())
    }
}

#[must_use]
pub fn const_definition() -> NodeDefinition {
    NodeDefinition::builder("Const", category(), "a constant data value")
        .callable()
        .input(Socket::data_input("value", "json").with_default(SocketValue::null()))
        .output(Socket::data_output("value", "json"))
        .executor(Arc::new(Const))
        .build()
}

/// Adds two numeric inputs.
struct Add;

#[async_trait]
impl Executor for Add {
    async fn execute(&self, ctx: &dyn ExecContext, _cancel: CancellationToken) -> Result<(), NodeError> {
        let a: i64 = ctx.input("a").await?;
        let b: i64 = ctx.input("b").await?;
        ctx.set_output("result", &(a + b)).await?;
        ctx.trigger(nebula_node::definition::EXIT);
        Ok(())
    }
}

#[must_use]
pub fn add_definition() -> NodeDefinition {
    NodeDefinition::builder("Add", category(), "adds two integers")
        .callable()
        .input(Socket::data_input("a", "int"))
        .input(Socket::data_input("b", "int"))
        .output(Socket::data_output("result", "int"))
        .executor(Arc::new(Add))
        .build()
}

/// A sink with one data input and no outputs: resolving it forces its
/// upstream producer chain to run. Declared an execution initiator so a
/// pure data pipeline (no `Start`/exec edges at all) still has something to
/// kick off the pull.
struct Consume;

#[async_trait]
impl Executor for Consume {
    async fn execute(&self, ctx: &dyn ExecContext, _cancel: CancellationToken) -> Result<(), NodeError> {
        let _ = ctx.input_value("value").await?;
        ctx.trigger(nebula_node::definition::EXIT);
        Ok(())
    }
}

#[must_use]
pub fn consume_definition() -> NodeDefinition {
    NodeDefinition::builder("Consume", category(), "forces resolution of an upstream value")
        .execution_initiator()
        .input(Socket::data_input("value", "json"))
        .executor(Arc::new(Consume))
        .build()
}
