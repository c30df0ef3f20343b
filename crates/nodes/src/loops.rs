//! Iteration nodes: `ForEach`, `While`, `DoWhile`, `RepeatUntil`,
//! `ForLoopStep`, `ParallelForEach`.
//!
//! A loop node signals [`LOOP_PATH`] once per invocation to request another
//! pass of its body, or [`EXIT`] to stop — it never loops inside its own
//! `execute` call. The engine re-invokes the node itself for the next
//! iteration (`nebula_engine`'s `run_loop`), running the body under a fresh
//! storage layer each time. Because of that, iteration state (current
//! index, "have we run once yet") has to survive between invocations in a
//! storage *variable*, not a local — each node namespaces its own variable
//! keys by its `node_id` so two loop nodes in the same scope never collide.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use nebula_action::{ExecContext, ExecContextExt, Executor, NodeError};
use nebula_core::Key;
use nebula_node::definition::{EXIT, LOOP_PATH};
use nebula_node::{NodeDefinition, Socket};
use nebula_value::SocketValue;
use tokio_util::sync::CancellationToken;

fn category() -> Key {
    Key::new("control.loop").expect("static category name")
}

fn var_key(ctx: &dyn ExecContext, suffix: &str) -> String {
    format!("nebula.loop.{}.{suffix}", ctx.node_id())
}

async fn get_counter(ctx: &dyn ExecContext, suffix: &str) -> i64 {
    ctx.get_variable(&var_key(ctx, suffix))
        .and_then(|v| v.to_value::<i64>().ok())
        .unwrap_or(0)
}

fn set_counter(ctx: &dyn ExecContext, suffix: &str, value: i64) {
    ctx.set_variable(&var_key(ctx, suffix), SocketValue::from_value(&value).unwrap());
}

async fn get_flag(ctx: &dyn ExecContext, suffix: &str) -> bool {
    ctx.get_variable(&var_key(ctx, suffix))
        .and_then(|v| v.to_value::<bool>().ok())
        .unwrap_or(false)
}

fn set_flag(ctx: &dyn ExecContext, suffix: &str, value: bool) {
    ctx.set_variable(&var_key(ctx, suffix), SocketValue::from_value(&value).unwrap());
}

/// Iterates a data input array, signalling `loop_path` once per element
/// with the element on `item` and its position on `index`, `exit` after the
/// last one.
struct ForEach;

#[async_trait]
impl Executor for ForEach {
    async fn execute(&self, ctx: &dyn ExecContext, _cancel: CancellationToken) -> Result<(), NodeError> {
        let items: Vec<serde_json::Value> = ctx.input("items").await?;
        let idx = get_counter(ctx, "index").await;

        if (idx as usize) < items.len() {
            ctx.set_output("item", &items[idx as usize]).await?;
            ctx.set_output("index", &idx).await?;
            set_counter(ctx, "index", idx + 1);
            ctx.trigger(LOOP_PATH);
        } else {
            ctx.trigger(EXIT);
        }
        Ok(())
    }
}

#[must_use]
pub fn for_each_definition() -> NodeDefinition {
    NodeDefinition::builder("ForEach", category(), "iterates an array, once per element")
        .callable()
        .input(Socket::data_input("items", "array<json>"))
        .output(Socket::data_output("item", "json"))
        .output(Socket::data_output("index", "int"))
        .output(Socket::exec_output(LOOP_PATH))
        .executor(Arc::new(ForEach))
        .build()
}

/// Re-evaluates `condition` before every iteration; loops while true.
struct While;

#[async_trait]
impl Executor for While {
    async fn execute(&self, ctx: &dyn ExecContext, _cancel: CancellationToken) -> Result<(), NodeError> {
        let condition: bool = ctx.input("condition").await?;
        ctx.trigger(if condition { LOOP_PATH } else { EXIT });
        Ok(())
    }
}

#[must_use]
pub fn while_definition() -> NodeDefinition {
    NodeDefinition::builder("While", category(), "loops while a condition holds, checked before each pass")
        .callable()
        .input(Socket::data_input("condition", "bool").with_default(SocketValue::from_value(&false).unwrap()))
        .output(Socket::exec_output(LOOP_PATH))
        .executor(Arc::new(While))
        .build()
}

/// Like `While`, but the condition is checked after the body: the first
/// invocation always signals `loop_path` unconditionally.
struct DoWhile;

#[async_trait]
impl Executor for DoWhile {
    async fn execute(&self, ctx: &dyn ExecContext, _cancel: CancellationToken) -> Result<(), NodeError> {
        if !get_flag(ctx, "started").await {
            set_flag(ctx, "started", true);
            ctx.trigger(LOOP_PATH);
            return Ok(());
        }
        let condition: bool = ctx.input("condition").await?;
        ctx.trigger(if condition { LOOP_PATH } else { EXIT });
        Ok(())
    }
}

#[must_use]
pub fn do_while_definition() -> NodeDefinition {
    NodeDefinition::builder("DoWhile", category(), "runs the body once, then loops while a condition holds")
        .callable()
        .input(Socket::data_input("condition", "bool").with_default(SocketValue::from_value(&false).unwrap()))
        .output(Socket::exec_output(LOOP_PATH))
        .executor(Arc::new(DoWhile))
        .build()
}

/// Inverse of `While`: loops while `condition` is false, exits once true.
struct RepeatUntil;

#[async_trait]
impl Executor for RepeatUntil {
    async fn execute(&self, ctx: &dyn ExecContext, _cancel: CancellationToken) -> Result<(), NodeError> {
        let condition: bool = ctx.input("condition").await?;
        ctx.trigger(if condition { EXIT } else { LOOP_PATH });
        Ok(())
    }
}

#[must_use]
pub fn repeat_until_definition() -> NodeDefinition {
    NodeDefinition::builder("RepeatUntil", category(), "loops until a condition becomes true")
        .callable()
        .input(Socket::data_input("condition", "bool").with_default(SocketValue::from_value(&false).unwrap()))
        .output(Socket::exec_output(LOOP_PATH))
        .executor(Arc::new(RepeatUntil))
        .build()
}

/// Steps `index` from `start` to `end` (inclusive) by `step`, signalling
/// `loop_path` for each step in range and `exit` after. `step == 0` exits
/// immediately rather than looping forever.
struct ForLoopStep;

#[async_trait]
impl Executor for ForLoopStep {
    async fn execute(&self, ctx: &dyn ExecContext, _cancel: CancellationToken) -> Result<(), NodeError> {
        let start: i64 = ctx.input("start").await?;
        let end: i64 = ctx.input("end").await?;
        let step: i64 = ctx.input("step").await?;

        if step == 0 {
            ctx.trigger(EXIT);
            return Ok(());
        }

        let index = if get_flag(ctx, "started").await {
            get_counter(ctx, "index").await
        } else {
            set_flag(ctx, "started", true);
            start
        };

        let in_range = if step > 0 { index <= end } else { index >= end };
        if in_range {
            ctx.set_output("index", &index).await?;
            set_counter(ctx, "index", index + step);
            ctx.trigger(LOOP_PATH);
        } else {
            ctx.trigger(EXIT);
        }
        Ok(())
    }
}

#[must_use]
pub fn for_loop_step_definition() -> NodeDefinition {
    NodeDefinition::builder("ForLoopStep", category(), "steps index from start to end (inclusive) by step")
        .callable()
        .input(Socket::data_input("start", "int").with_default(SocketValue::from_value(&0_i64).unwrap()))
        .input(Socket::data_input("end", "int").with_default(SocketValue::from_value(&0_i64).unwrap()))
        .input(Socket::data_input("step", "int").with_default(SocketValue::from_value(&1_i64).unwrap()))
        .output(Socket::data_output("index", "int"))
        .output(Socket::exec_output(LOOP_PATH))
        .executor(Arc::new(ForLoopStep))
        .build()
}

/// Streams every element of `items` through the `item`/`on_item` stream
/// triplet, up to `max_parallelism` iterations in flight at once, instead of
/// the `loop_path` re-invocation protocol the other loop nodes use.
///
/// This is the one loop-shaped node that isn't built on `loop_path`: true
/// concurrent iteration bodies need more than one body running at a time,
/// which `run_loop`'s single-body-per-reinvocation protocol can't express.
/// Bounded concurrency comes from polling up to `max_parallelism` `ctx.emit`
/// calls at once via `buffer_unordered` rather than awaiting them one at a
/// time — in `Sequential` stream mode (where `emit` awaits an item's full
/// downstream chain before returning) this genuinely overlaps iterations
/// whenever their bodies wait on I/O, e.g. a `Delay`. `max_parallelism` is
/// clamped to a minimum of 1 so a misconfigured `0` or negative value
/// degrades to serial iteration instead of deadlocking `buffer_unordered`.
///
/// All iterations share the enclosing storage scope rather than each
/// getting a distinct child layer — the stream/emit protocol this is built
/// on doesn't yet thread a per-item child scope through `propagate_signal`.
/// Iteration bodies that write to the same variable therefore still race,
/// same as calling the same upstream node body concurrently from two
/// branches would.
struct ParallelForEach;

#[async_trait]
impl Executor for ParallelForEach {
    async fn execute(&self, ctx: &dyn ExecContext, cancel: CancellationToken) -> Result<(), NodeError> {
        let items: Vec<serde_json::Value> = ctx.input("items").await?;
        let max_parallelism: i64 = ctx.input("max_parallelism").await?;
        let max_parallelism = max_parallelism.max(1) as usize;

        let results: Vec<Result<(), NodeError>> = stream::iter(items.into_iter())
            .map(|item| {
                let cancel = cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        return Err(NodeError::Cancelled);
                    }
                    let boxed = SocketValue::from_value(&item).map_err(|source| NodeError::OutputEncode {
                        socket: "item".to_string(),
                        source,
                    })?;
                    ctx.emit("item", boxed).await
                }
            })
            .buffer_unordered(max_parallelism)
            .collect()
            .await;

        for result in results {
            result?;
        }
        Ok(())
    }
}

#[must_use]
pub fn parallel_for_each_definition() -> NodeDefinition {
    NodeDefinition::builder(
        "ParallelForEach",
        category(),
        "streams every element of an array, up to max_parallelism iterations concurrently",
    )
    .callable()
    .input(Socket::data_input("items", "array<json>"))
    .input(Socket::data_input("max_parallelism", "int").with_default(SocketValue::from_value(&1_i64).unwrap()))
    .stream_output("item", "on_item", Some(EXIT))
    .executor(Arc::new(ParallelForEach))
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
        outputs: RwLock<HashMap<String, SocketValue>>,
        variables: RwLock<HashMap<String, SocketValue>>,
        triggered: RwLock<Vec<String>>,
    }

    impl TestContext {
        fn new() -> Self {
            Self {
                node_id: nebula_core::id::NodeId::v4(),
                cancel: CancellationToken::new(),
                inputs: RwLock::new(HashMap::new()),
                outputs: RwLock::new(HashMap::new()),
                variables: RwLock::new(HashMap::new()),
                triggered: RwLock::new(Vec::new()),
            }
        }

        fn with_input(mut self, socket: &str, value: SocketValue) -> Self {
            self.inputs.get_mut().insert(socket.to_string(), value);
            self
        }

        fn last_trigger(&self) -> String {
            self.triggered.read().last().cloned().unwrap_or_default()
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
        async fn set_output_value(&self, socket: &str, value: SocketValue) -> Result<(), NodeError> {
            self.outputs.write().insert(socket.to_string(), value);
            Ok(())
        }
        fn trigger(&self, exec_output: &str) {
            self.triggered.write().push(exec_output.to_string());
        }
        async fn emit(&self, item_socket: &str, value: SocketValue) -> Result<(), NodeError> {
            self.set_output_value(item_socket, value).await?;
            self.trigger("on_item");
            Ok(())
        }
        fn get_variable(&self, key: &str) -> Option<SocketValue> {
            self.variables.read().get(key).cloned()
        }
        fn set_variable(&self, key: &str, value: SocketValue) {
            self.variables.write().insert(key.to_string(), value);
        }
        fn emit_feedback(&self, _message: &str) {}
    }

    fn items(values: &[i64]) -> SocketValue {
        let json: Vec<serde_json::Value> =
            values.iter().map(|n| serde_json::json!(n)).collect();
        SocketValue::from_value(&json).unwrap()
    }

    #[tokio::test]
    async fn for_each_signals_loop_path_per_element_then_exit() {
        let ctx = TestContext::new().with_input("items", items(&[10, 20]));

        ForEach.execute(&ctx, CancellationToken::new()).await.unwrap();
        assert_eq!(ctx.last_trigger(), LOOP_PATH);
        let idx0: i64 = ctx.outputs.read().get("index").unwrap().to_value().unwrap();
        assert_eq!(idx0, 0);

        ForEach.execute(&ctx, CancellationToken::new()).await.unwrap();
        assert_eq!(ctx.last_trigger(), LOOP_PATH);
        let idx1: i64 = ctx.outputs.read().get("index").unwrap().to_value().unwrap();
        assert_eq!(idx1, 1);

        ForEach.execute(&ctx, CancellationToken::new()).await.unwrap();
        assert_eq!(ctx.last_trigger(), EXIT);
    }

    #[tokio::test]
    async fn for_each_exits_immediately_on_empty_array() {
        let ctx = TestContext::new().with_input("items", items(&[]));
        ForEach.execute(&ctx, CancellationToken::new()).await.unwrap();
        assert_eq!(ctx.last_trigger(), EXIT);
    }

    #[tokio::test]
    async fn while_loops_then_exits_when_condition_flips() {
        let ctx = TestContext::new().with_input("condition", SocketValue::from_value(&true).unwrap());
        While.execute(&ctx, CancellationToken::new()).await.unwrap();
        assert_eq!(ctx.last_trigger(), LOOP_PATH);

        ctx.inputs
            .write()
            .insert("condition".to_string(), SocketValue::from_value(&false).unwrap());
        While.execute(&ctx, CancellationToken::new()).await.unwrap();
        assert_eq!(ctx.last_trigger(), EXIT);
    }

    #[tokio::test]
    async fn do_while_runs_body_once_before_checking_condition() {
        let ctx = TestContext::new().with_input("condition", SocketValue::from_value(&false).unwrap());
        DoWhile.execute(&ctx, CancellationToken::new()).await.unwrap();
        assert_eq!(ctx.last_trigger(), LOOP_PATH, "first pass always runs regardless of condition");

        DoWhile.execute(&ctx, CancellationToken::new()).await.unwrap();
        assert_eq!(ctx.last_trigger(), EXIT);
    }

    #[tokio::test]
    async fn repeat_until_loops_while_condition_false() {
        let ctx = TestContext::new().with_input("condition", SocketValue::from_value(&false).unwrap());
        RepeatUntil.execute(&ctx, CancellationToken::new()).await.unwrap();
        assert_eq!(ctx.last_trigger(), LOOP_PATH);

        ctx.inputs
            .write()
            .insert("condition".to_string(), SocketValue::from_value(&true).unwrap());
        RepeatUntil.execute(&ctx, CancellationToken::new()).await.unwrap();
        assert_eq!(ctx.last_trigger(), EXIT);
    }

    #[tokio::test]
    async fn for_loop_step_scenario_zero_to_two_step_one() {
        let ctx = TestContext::new()
            .with_input("start", SocketValue::from_value(&0_i64).unwrap())
            .with_input("end", SocketValue::from_value(&2_i64).unwrap())
            .with_input("step", SocketValue::from_value(&1_i64).unwrap());

        let mut loop_passes = 0;
        for _ in 0..4 {
            ForLoopStep.execute(&ctx, CancellationToken::new()).await.unwrap();
            if ctx.last_trigger() == LOOP_PATH {
                loop_passes += 1;
            }
        }
        assert_eq!(loop_passes, 3, "indices 0, 1, 2");
        assert_eq!(ctx.last_trigger(), EXIT, "the 4th invocation exits");
    }

    #[tokio::test]
    async fn for_loop_step_zero_step_exits_immediately() {
        let ctx = TestContext::new()
            .with_input("start", SocketValue::from_value(&0_i64).unwrap())
            .with_input("end", SocketValue::from_value(&5_i64).unwrap())
            .with_input("step", SocketValue::from_value(&0_i64).unwrap());
        ForLoopStep.execute(&ctx, CancellationToken::new()).await.unwrap();
        assert_eq!(ctx.last_trigger(), EXIT);
    }

    #[tokio::test]
    async fn parallel_for_each_emits_every_item_then_returns() {
        let ctx = TestContext::new().with_input("items", items(&[1, 2, 3]));
        ParallelForEach.execute(&ctx, CancellationToken::new()).await.unwrap();
        assert_eq!(ctx.triggered.read().iter().filter(|s| s.as_str() == "on_item").count(), 3);
    }

    #[tokio::test]
    async fn parallel_for_each_clamps_non_positive_max_parallelism_to_one() {
        let ctx = TestContext::new()
            .with_input("items", items(&[1, 2]))
            .with_input("max_parallelism", SocketValue::from_value(&0_i64).unwrap());
        ParallelForEach.execute(&ctx, CancellationToken::new()).await.unwrap();
        assert_eq!(ctx.triggered.read().iter().filter(|s| s.as_str() == "on_item").count(), 2);

        let ctx = TestContext::new()
            .with_input("items", items(&[1, 2]))
            .with_input("max_parallelism", SocketValue::from_value(&-5_i64).unwrap());
        ParallelForEach.execute(&ctx, CancellationToken::new()).await.unwrap();
        assert_eq!(ctx.triggered.read().iter().filter(|s| s.as_str() == "on_item").count(), 2);
    }

    #[tokio::test]
    async fn parallel_for_each_stops_on_cancellation() {
        let ctx = TestContext::new().with_input("items", items(&[1, 2, 3]));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = ParallelForEach.execute(&ctx, cancel).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    /// Drives `ParallelForEach` through a real `Engine` (not the hand-rolled
    /// `TestContext` above) wired to a downstream `Marker` on its `on_item`
    /// stream signal, and asserts the consumer runs exactly once per emitted
    /// item rather than once extra for whatever item happened to be
    /// published last when the body returned.
    async fn stream_through_real_engine(stream_mode: nebula_action::StreamMode) -> std::sync::Arc<crate::control::Marker> {
        use crate::control::Marker;
        use nebula_eventbus::EventBus;
        use nebula_node::{Connection, NodeDefinition, NodeRegistry};
        use nebula_storage::{RuntimeStorage, Storage};
        use std::sync::Arc as StdArc;

        let marker = StdArc::new(Marker::new());
        let marker_definition = NodeDefinition::builder(
            "StreamTestMarker",
            Key::new("test").unwrap(),
            "counts invocations for the streaming integration test",
        )
        .callable()
        .executor(marker.clone())
        .build();

        let mut registry = NodeRegistry::new();
        let start_id = registry.register(crate::control::start_definition()).unwrap();
        let producer_id = registry.register(parallel_for_each_definition()).unwrap();
        let marker_id = registry.register(marker_definition).unwrap();

        let start_node = registry.get(start_id).unwrap().factory();
        let mut producer_node = registry.get(producer_id).unwrap().factory();
        if let nebula_node::NodeData::Single { inputs, .. } = &mut producer_node {
            *inputs = vec![
                Socket::data_input("items", "array<json>").with_default(items(&[1, 2, 3])),
                Socket::data_input("max_parallelism", "int")
                    .with_default(SocketValue::from_value(&2_i64).unwrap()),
            ];
        }
        let marker_node = registry.get(marker_id).unwrap().factory();

        let start_placed = start_node.id();
        let producer_placed = producer_node.id();
        let marker_placed = marker_node.id();

        let nodes = vec![start_node, producer_node, marker_node];
        let connections = vec![
            Connection::execution(start_placed, "exit", producer_placed, "enter"),
            Connection::execution(producer_placed, "on_item", marker_placed, "enter"),
        ];

        let engine = nebula_engine::Engine::new(StdArc::new(registry));
        let storage: StdArc<dyn Storage> = StdArc::new(RuntimeStorage::new(EventBus::new(16)));

        let options = nebula_engine::ExecutionOptions::new().with_stream_mode(stream_mode);
        engine
            .execute(
                &nodes,
                &connections,
                storage,
                serde_json::Value::Null,
                options,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        marker
    }

    #[tokio::test]
    async fn real_engine_runs_stream_consumer_once_per_item_sequential() {
        let marker = stream_through_real_engine(nebula_action::StreamMode::Sequential).await;
        assert_eq!(marker.invocation_count(), 3);
    }

    #[tokio::test]
    async fn real_engine_runs_stream_consumer_once_per_item_fire_and_forget() {
        let marker = stream_through_real_engine(nebula_action::StreamMode::FireAndForget).await;
        assert_eq!(marker.invocation_count(), 3);
    }
}
