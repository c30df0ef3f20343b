//! The lazy-pull execution engine.
//!
//! A node's data inputs are never scheduled ahead of time: reading one that
//! has no value yet recursively runs its producer, right there, and
//! memoises the result in the active scope. Execution-output signals
//! (`trigger`, `emit`'s implicit `on_item`) drive the control-flow side
//! separately, by walking outgoing execution edges in the order they were
//! signalled. The two halves only meet inside one node's invocation: a body
//! pulls whatever data it needs, then signals whatever it's done.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashSet;
use futures::future::BoxFuture;
use nebula_action::{ExecSignals, NodeError};
use nebula_core::id::{ExecutionId, NodeId};
use nebula_eventbus::{Event, EventBus};
use nebula_execution::{Plan, PlanError};
use nebula_node::definition::{EXIT, LOOP_PATH};
use nebula_node::{Connection, NodeData, NodeRegistry};
use nebula_storage::{Storage, create_child};
use nebula_value::SocketValue;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::context::EngineContext;
use crate::error::ExecError;
use crate::gate::StepGate;
use crate::metrics::EngineMetrics;
use crate::options::{ExecutionMode, ExecutionOptions};
use crate::run::{RunState, Scope};

/// Executes node graphs built from [`NodeData`]/[`Connection`] lists.
///
/// Cheap to clone: every field is an `Arc`, so a clone shares the same
/// registry and metrics rather than copying them. Cloning is how the engine
/// crosses into spawned tasks (parallel scheduling, fire-and-forget stream
/// dispatch) without threading lifetimes through `tokio::spawn`.
#[derive(Clone)]
pub struct Engine {
    registry: Arc<NodeRegistry>,
    metrics: Arc<EngineMetrics>,
}

impl Engine {
    /// A fresh engine over the given definition registry.
    #[must_use]
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self {
            registry,
            metrics: Arc::new(EngineMetrics::new()),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    #[must_use]
    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// A shared handle to this engine's metrics, for wiring a [`crate::queue::JobQueue`]
    /// to the same counters `metrics()` reads.
    #[must_use]
    pub fn metrics_handle(&self) -> Arc<EngineMetrics> {
        self.metrics.clone()
    }

    /// Run a flat node graph to completion.
    ///
    /// Builds a [`Plan`] from `nodes`/`connections`, then runs every
    /// execution initiator (`Sequential`: in declaration order; `Parallel`:
    /// concurrently, bounded by `options.mode`'s `max_parallelism`).
    /// `user_ctx` is opaque to the engine — it is stashed on the run and
    /// never otherwise inspected, for an embedder to thread its own request
    /// context through `ExecContext` implementations that need it.
    pub async fn execute(
        &self,
        nodes: &[NodeData],
        connections: &[Connection],
        storage: Arc<dyn Storage>,
        user_ctx: serde_json::Value,
        options: ExecutionOptions,
        cancel: CancellationToken,
    ) -> Result<(), ExecError> {
        self.execute_with_gate(
            nodes,
            connections,
            storage,
            user_ctx,
            options,
            cancel,
            Arc::new(StepGate::new()),
        )
        .await
    }

    /// Like [`Self::execute`], but scheduling passes through `gate` at every
    /// checkpoint instead of a fresh, always-`Running` one.
    ///
    /// Lets a caller start a run already paused ([`StepGate::start_paused`])
    /// and drive it one node at a time with [`StepGate::step_once`] — the CLI's
    /// `--step` flag and any other debugger-style embedder use this instead
    /// of `execute`.
    pub async fn execute_with_gate(
        &self,
        nodes: &[NodeData],
        connections: &[Connection],
        storage: Arc<dyn Storage>,
        user_ctx: serde_json::Value,
        options: ExecutionOptions,
        cancel: CancellationToken,
        gate: Arc<StepGate>,
    ) -> Result<(), ExecError> {
        let plan = Arc::new(Plan::build(nodes, connections)?);
        self.run_to_completion(plan, storage, user_ctx, options, cancel, gate)
            .await
    }

    /// Run a single group node's inner subgraph to completion, standalone
    /// (not nested inside a larger `execute` call).
    ///
    /// `parent_storage` plays the role the surrounding scope's storage would
    /// in a nested group execution: the group's declared input sockets are
    /// read directly from it at `(group.id(), socket)` — the caller is
    /// expected to have seeded those before calling — and its resolved
    /// outputs are written back the same way.
    pub async fn execute_group(
        &self,
        group: &NodeData,
        parent_storage: Arc<dyn Storage>,
        user_ctx: serde_json::Value,
        options: ExecutionOptions,
        cancel: CancellationToken,
    ) -> Result<(), ExecError> {
        if !group.is_group() {
            return Err(ExecError::Type(
                group.id(),
                "execute_group called on a non-group node".to_string(),
            ));
        }
        let run = Arc::new(RunState {
            registry: self.registry.clone(),
            metrics: self.metrics.clone(),
            execution_id: ExecutionId::v4(),
            options,
            gate: Arc::new(StepGate::new()),
            user_ctx,
            active_pulls: Arc::new(DashSet::new()),
        });

        parent_storage.event_bus().emit(Event::ExecutionStarted {
            execution_id: run.execution_id,
        });
        let started = Instant::now();
        let result = self
            .run_group_inner(&run, None, &parent_storage, group, &cancel)
            .await
            .map(|_signals| ());
        emit_completion(parent_storage.event_bus(), &run, started, &result);
        result
    }

    async fn run_to_completion(
        &self,
        plan: Arc<Plan>,
        storage: Arc<dyn Storage>,
        user_ctx: serde_json::Value,
        options: ExecutionOptions,
        cancel: CancellationToken,
        gate: Arc<StepGate>,
    ) -> Result<(), ExecError> {
        let run = Arc::new(RunState {
            registry: self.registry.clone(),
            metrics: self.metrics.clone(),
            execution_id: ExecutionId::v4(),
            options,
            gate,
            user_ctx,
            active_pulls: Arc::new(DashSet::new()),
        });

        storage.event_bus().emit(Event::ExecutionStarted {
            execution_id: run.execution_id,
        });
        let started = Instant::now();
        let scope = Scope { plan, storage: storage.clone() };
        let result = self.run_initiators(&run, scope, &cancel).await;
        emit_completion(storage.event_bus(), &run, started, &result);
        result
    }

    /// Run every execution initiator in `scope.plan`.
    fn run_initiators<'a>(
        &'a self,
        run: &'a Arc<RunState>,
        scope: Scope,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<(), ExecError>> {
        Box::pin(async move {
            let initiators = scope.plan.initiators().to_vec();
            self.run_many(run, scope, initiators, cancel).await
        })
    }

    /// Run `node_ids` to completion, scheduled per `run.options.mode`.
    async fn run_many(
        &self,
        run: &Arc<RunState>,
        scope: Scope,
        node_ids: Vec<NodeId>,
        cancel: &CancellationToken,
    ) -> Result<(), ExecError> {
        match run.options.mode {
            ExecutionMode::Sequential => {
                for node_id in node_ids {
                    if cancel.is_cancelled() {
                        return Err(ExecError::Cancelled);
                    }
                    self.run_chain(run, scope.clone(), node_id, cancel).await?;
                }
                Ok(())
            }
            ExecutionMode::Parallel { max_parallelism } => {
                self.run_many_parallel(run, scope, node_ids, cancel, max_parallelism).await
            }
        }
    }

    async fn run_many_parallel(
        &self,
        run: &Arc<RunState>,
        scope: Scope,
        node_ids: Vec<NodeId>,
        cancel: &CancellationToken,
        max_parallelism: usize,
    ) -> Result<(), ExecError> {
        if node_ids.is_empty() {
            return Ok(());
        }
        let semaphore = Arc::new(Semaphore::new(max_parallelism.max(1)));
        let mut joins = JoinSet::new();
        for node_id in node_ids {
            let semaphore = semaphore.clone();
            let engine = self.clone();
            let run = run.clone();
            let scope = scope.clone();
            let cancel = cancel.clone();
            joins.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore is never closed while its owning run is alive");
                engine.run_chain(&run, scope, node_id, &cancel).await
            });
        }

        let mut first_err = None;
        while let Some(joined) = joins.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    if first_err.is_none() {
                        cancel.cancel();
                        first_err = Some(err);
                    }
                }
                Err(join_err) if join_err.is_cancelled() => {}
                Err(join_err) => std::panic::resume_unwind(join_err.into_panic()),
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Run one node body, then propagate whatever it signalled.
    fn run_chain<'a>(
        &'a self,
        run: &'a Arc<RunState>,
        scope: Scope,
        node_id: NodeId,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<(), ExecError>> {
        Box::pin(async move {
            if run.gate.wait_turn(cancel).await || cancel.is_cancelled() {
                return Err(ExecError::Cancelled);
            }
            let signals = self.execute_body(run, &scope, node_id, cancel).await?;
            self.propagate(run, scope, node_id, signals, cancel).await
        })
    }

    /// Follow every signalled execution output to its targets, in the order
    /// the node body raised them. A `loop_path` signal runs the loop body
    /// under a fresh storage layer per iteration instead of a single pass.
    fn propagate<'a>(
        &'a self,
        run: &'a Arc<RunState>,
        scope: Scope,
        node_id: NodeId,
        signals: ExecSignals,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<(), ExecError>> {
        Box::pin(async move {
            for output in signals.iter() {
                if output == LOOP_PATH {
                    self.run_loop(run, scope.clone(), node_id, cancel).await?;
                    continue;
                }
                self.propagate_signal(run, scope.clone(), node_id, output, cancel).await?;
            }
            Ok(())
        })
    }

    /// Schedule whatever is wired to `(node_id, signal)`'s outgoing
    /// execution edges. Shared by normal signal propagation and by
    /// streamed-item dispatch (`ExecContext::emit`), which raises a signal
    /// outside of the owning node body's own `propagate` pass.
    pub(crate) async fn propagate_signal(
        &self,
        run: &Arc<RunState>,
        scope: Scope,
        node_id: NodeId,
        signal: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ExecError> {
        let targets: Vec<NodeId> = scope
            .plan
            .outgoing(node_id, signal)
            .iter()
            .filter(|c| c.is_execution)
            .map(|c| c.input_node)
            .collect();
        self.run_many(run, scope, targets, cancel).await
    }

    /// Run a loop node's body under a fresh child storage layer each
    /// iteration, re-invoking the loop node itself (in the outer scope, so
    /// its own variable state persists across iterations) until it signals
    /// `exit` instead of `loop_path`.
    fn run_loop<'a>(
        &'a self,
        run: &'a Arc<RunState>,
        outer: Scope,
        loop_node: NodeId,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<(), ExecError>> {
        Box::pin(async move {
            let mut iteration: u64 = 0;
            loop {
                if cancel.is_cancelled() {
                    return Err(ExecError::Cancelled);
                }
                let body_storage =
                    create_child(outer.storage.clone(), format!("loop:{loop_node}:{iteration}"));
                body_storage.push_generation();
                let body_scope = Scope { plan: outer.plan.clone(), storage: body_storage };
                let body_targets: Vec<NodeId> = outer
                    .plan
                    .outgoing(loop_node, LOOP_PATH)
                    .iter()
                    .filter(|c| c.is_execution)
                    .map(|c| c.input_node)
                    .collect();
                self.run_many(run, body_scope, body_targets, cancel).await?;
                iteration += 1;

                if run.gate.wait_turn(cancel).await || cancel.is_cancelled() {
                    return Err(ExecError::Cancelled);
                }
                let signals = self.execute_body(run, &outer, loop_node, cancel).await?;
                if signals.contains(EXIT) {
                    return self.propagate(run, outer, loop_node, signals, cancel).await;
                }
                if !signals.contains(LOOP_PATH) {
                    return Ok(());
                }
            }
        })
    }

    /// Run one node's body unconditionally (no memoisation check — callers
    /// that want memoisation go through `ensure_executed`), emitting
    /// lifecycle events and recording metrics either way.
    fn execute_body<'a>(
        &'a self,
        run: &'a Arc<RunState>,
        scope: &'a Scope,
        node_id: NodeId,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<ExecSignals, ExecError>> {
        Box::pin(async move {
            let node = scope
                .plan
                .node(node_id)
                .expect("node id comes from this plan's own node/connection list");

            if node.is_group() {
                return self.run_group_inner(run, Some(scope), &scope.storage, node, cancel).await;
            }

            let NodeData::Single { definition_id, .. } = node else {
                unreachable!("non-group node is always NodeData::Single")
            };
            let definition = self
                .registry
                .get(*definition_id)
                .ok_or(ExecError::Plan(PlanError::UnknownDefinition(*definition_id)))?;
            let executor = definition
                .executor()
                .ok_or_else(|| ExecError::Node(node_id, NodeError::fatal("node has no executor")))?
                .clone();

            let generation = scope.storage.current_generation();
            scope.storage.event_bus().emit(Event::NodeStarted {
                execution_id: run.execution_id,
                node_id,
                generation,
            });
            let started = Instant::now();

            let ctx = EngineContext::new(self, run.clone(), scope.clone(), node_id, cancel.clone());
            let outcome = executor.execute(&ctx, cancel.child_token()).await;
            let mut signals = ctx.take_signals();

            let mut first_stream_err = None;
            for handle in ctx.take_pending_streams() {
                match handle.await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        first_stream_err.get_or_insert(err);
                    }
                    Err(join_err) if join_err.is_cancelled() => {}
                    Err(join_err) => std::panic::resume_unwind(join_err.into_panic()),
                }
            }

            scope.storage.mark_node_executed(node_id);

            match (outcome, first_stream_err) {
                (Ok(()), None) => {
                    run.metrics.record_node_executed();
                    for triplet in definition.stream_sockets() {
                        // `emit` already propagated `on_item_exec` itself (inline in
                        // Sequential mode, tracked via `pending_streams` in
                        // FireAndForget); only `completed_exec` is left for the
                        // post-body propagate pass.
                        signals.remove(&triplet.on_item_exec);
                        if let Some(completed) = &triplet.completed_exec {
                            signals.signal(completed.clone());
                        }
                    }
                    scope.storage.event_bus().emit(Event::NodeCompleted {
                        execution_id: run.execution_id,
                        node_id,
                        duration: started.elapsed(),
                    });
                    Ok(signals)
                }
                (Ok(()), Some(stream_err)) => {
                    run.metrics.record_node_failed();
                    scope.storage.event_bus().emit(Event::NodeFailed {
                        execution_id: run.execution_id,
                        node_id,
                        error: stream_err.to_string(),
                    });
                    Err(stream_err)
                }
                (Err(err), _) => {
                    run.metrics.record_node_failed();
                    scope.storage.event_bus().emit(Event::NodeFailed {
                        execution_id: run.execution_id,
                        node_id,
                        error: err.to_string(),
                    });
                    if err.is_cancelled() {
                        Err(ExecError::Cancelled)
                    } else {
                        Err(ExecError::Node(node_id, err))
                    }
                }
            }
        })
    }

    /// Run a group's inner subgraph: seed the child layer's boundary
    /// inputs, run the inner plan, copy resolved outputs back to the parent.
    ///
    /// `outer` is `Some` when this group is reached from within a larger
    /// execution (inputs are resolved against `outer`'s plan/storage); `None`
    /// for a standalone `execute_group` call, where boundary inputs are read
    /// directly from `parent_storage` at the group's own id.
    fn run_group_inner<'a>(
        &'a self,
        run: &'a Arc<RunState>,
        outer: Option<&'a Scope>,
        parent_storage: &'a Arc<dyn Storage>,
        group: &'a NodeData,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<ExecSignals, ExecError>> {
        Box::pin(async move {
            let NodeData::Group {
                id: group_id,
                nodes,
                connections,
                input_mapping,
                output_mapping,
                ..
            } = group
            else {
                unreachable!("run_group_inner only called with a NodeData::Group")
            };

            let inner_plan = Arc::new(Plan::build(nodes, connections)?);
            let child_storage =
                create_child(parent_storage.clone(), format!("group:{group_id}"));
            child_storage.push_generation();

            for (outer_socket, inner_node, inner_socket) in input_mapping {
                let value = match outer {
                    Some(scope) => {
                        self.resolve_input(run, scope, *group_id, outer_socket, cancel).await?
                    }
                    None => parent_storage
                        .get_socket_value(*group_id, outer_socket)
                        .unwrap_or_default(),
                };
                child_storage.set_socket_value(*inner_node, inner_socket, value);
            }

            let inner_scope = Scope { plan: inner_plan, storage: child_storage.clone() };
            self.run_initiators(run, inner_scope, cancel).await?;

            for (outer_socket, inner_node, inner_socket) in output_mapping {
                let value = child_storage
                    .get_socket_value(*inner_node, inner_socket)
                    .unwrap_or_default();
                parent_storage.set_socket_value(*group_id, outer_socket, value);
            }

            let mut signals = ExecSignals::new();
            signals.signal(EXIT);
            Ok(signals)
        })
    }

    /// Memoised data-pull: run `node_id` purely to populate its data
    /// outputs if it hasn't executed in `scope` yet, guarded against a
    /// cycle spanning a group boundary by `run.active_pulls`.
    fn ensure_executed<'a>(
        &'a self,
        run: &'a Arc<RunState>,
        scope: &'a Scope,
        node_id: NodeId,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<(), ExecError>> {
        Box::pin(async move {
            if scope.storage.is_node_executed(node_id) {
                return Ok(());
            }
            if !run.active_pulls.insert(node_id) {
                return Err(ExecError::Plan(PlanError::DataCycle(node_id)));
            }
            let result = self.execute_body(run, scope, node_id, cancel).await;
            run.active_pulls.remove(&node_id);
            result.map(|_signals| ())
        })
    }

    /// Resolve `(node_id, socket)`'s value: a value already sitting directly
    /// at that key (group-boundary seeding), else the producer wired to it
    /// (pulled lazily if it hasn't run yet), else the socket's declared
    /// default.
    pub(crate) fn resolve_input<'a>(
        &'a self,
        run: &'a Arc<RunState>,
        scope: &'a Scope,
        node_id: NodeId,
        socket: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<SocketValue, ExecError>> {
        Box::pin(async move {
            if let Some(value) = scope.storage.get_socket_value(node_id, socket) {
                return Ok(value);
            }
            if let Some(conn) = scope.plan.data_source(node_id, socket) {
                let producer = conn.output_node;
                let producer_socket = conn.output_socket.clone();
                if let Some(value) = scope.storage.get_socket_value(producer, &producer_socket) {
                    return Ok(value);
                }
                self.ensure_executed(run, scope, producer, cancel).await?;
                return Ok(scope
                    .storage
                    .get_socket_value(producer, &producer_socket)
                    .unwrap_or_default());
            }
            let default = scope
                .plan
                .node(node_id)
                .and_then(|n| n.find_input(socket))
                .and_then(|s| s.default_value().cloned());
            Ok(default.unwrap_or_default())
        })
    }

    /// Look up the execution output paired with `item_socket` on `node_id`'s
    /// stream triplet, falling back to the conventional `"on_item"` name if
    /// the node isn't found (defensive only — every stream-output node goes
    /// through `Builder::stream_output`, which always records the triplet).
    pub(crate) fn on_item_exec(&self, scope: &Scope, node_id: NodeId, item_socket: &str) -> Option<String> {
        let node = scope.plan.node(node_id)?;
        let NodeData::Single { definition_id, .. } = node else {
            return None;
        };
        let definition = self.registry.get(*definition_id)?;
        definition
            .stream_sockets()
            .iter()
            .find(|t| t.item_socket == item_socket)
            .map(|t| t.on_item_exec.clone())
    }
}

fn emit_completion(
    event_bus: &EventBus,
    run: &RunState,
    started: Instant,
    result: &Result<(), ExecError>,
) {
    match result {
        Ok(()) => event_bus.emit(Event::ExecutionCompleted {
            execution_id: run.execution_id,
            duration: started.elapsed(),
        }),
        Err(err) if err.is_cancelled() => event_bus.emit(Event::ExecutionCancelled {
            execution_id: run.execution_id,
        }),
        Err(err) => event_bus.emit(Event::ExecutionFailed {
            execution_id: run.execution_id,
            error: err.to_string(),
        }),
    }
}
