//! The `ExecContext` implementation backed by [`nebula_storage::Storage`].
//!
//! One [`EngineContext`] is built per node invocation. It borrows nothing
//! the executor could outlive: everything it needs is cloned `Arc`s plus the
//! node's own id, so it can be constructed fresh for every call to
//! [`Executor::execute`](nebula_action::Executor::execute).

use std::sync::Arc;

use async_trait::async_trait;
use nebula_action::{ExecContext, ExecSignals, NodeError, StreamMode};
use nebula_core::id::NodeId;
use nebula_storage::Storage;
use nebula_value::SocketValue;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::engine::Engine;
use crate::error::ExecError;
use crate::run::{RunState, Scope};

/// Context handed to one node body's `execute` call.
///
/// `input_value` and `emit` both call back into [`Engine`]'s recursive
/// scheduling — `input_value` to lazily pull an unpublished producer,
/// `emit` to run (or spawn) the downstream chain for a streamed item. The
/// signals a body raises via `trigger`/`emit` accumulate in `signals` for
/// the engine to drain once the body returns.
pub(crate) struct EngineContext<'a> {
    pub(crate) engine: &'a Engine,
    pub(crate) run: Arc<RunState>,
    pub(crate) scope: Scope,
    pub(crate) node_id: NodeId,
    pub(crate) cancel: CancellationToken,
    pub(crate) signals: Mutex<ExecSignals>,
    /// `FireAndForget` stream items spawned during this invocation, awaited
    /// by `Engine::execute_body` once the executor returns so `completed_exec`
    /// only fires after every item's downstream chain has finished.
    pending_streams: Mutex<Vec<JoinHandle<Result<(), ExecError>>>>,
}

impl<'a> EngineContext<'a> {
    pub(crate) fn new(
        engine: &'a Engine,
        run: Arc<RunState>,
        scope: Scope,
        node_id: NodeId,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            engine,
            run,
            scope,
            node_id,
            cancel,
            signals: Mutex::new(ExecSignals::new()),
            pending_streams: Mutex::new(Vec::new()),
        }
    }

    /// Drain the signals raised during this invocation. Consumes `self`'s
    /// interior state; called once, after the executor returns.
    pub(crate) fn take_signals(&self) -> ExecSignals {
        std::mem::take(&mut self.signals.lock())
    }

    /// Drain the `FireAndForget` stream tasks spawned during this
    /// invocation, for the engine to await before continuing.
    pub(crate) fn take_pending_streams(&self) -> Vec<JoinHandle<Result<(), ExecError>>> {
        std::mem::take(&mut self.pending_streams.lock())
    }

    fn storage(&self) -> &Arc<dyn Storage> {
        &self.scope.storage
    }
}

#[async_trait]
impl<'a> ExecContext for EngineContext<'a> {
    fn node_id(&self) -> NodeId {
        self.node_id
    }

    fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn generation(&self) -> u64 {
        self.storage().current_generation()
    }

    async fn input_value(&self, socket: &str) -> Result<SocketValue, NodeError> {
        self.engine
            .resolve_input(&self.run, &self.scope, self.node_id, socket, &self.cancel)
            .await
            .map_err(exec_to_node_error)
    }

    async fn set_output_value(&self, socket: &str, value: SocketValue) -> Result<(), NodeError> {
        self.storage().set_socket_value(self.node_id, socket, value);
        Ok(())
    }

    fn trigger(&self, exec_output: &str) {
        self.signals.lock().signal(exec_output);
    }

    async fn emit(&self, item_socket: &str, value: SocketValue) -> Result<(), NodeError> {
        self.set_output_value(item_socket, value).await?;
        let on_item = self
            .engine
            .on_item_exec(&self.scope, self.node_id, item_socket)
            .unwrap_or_else(|| "on_item".to_string());
        self.signals.lock().signal(on_item.clone());

        self.storage().event_bus().emit(nebula_eventbus::Event::Streamed {
            execution_id: self.run.execution_id,
            node_id: self.node_id,
            socket: item_socket.to_string(),
        });

        match self.run.options.stream_mode {
            StreamMode::Sequential => self
                .engine
                .propagate_signal(&self.run, self.scope.clone(), self.node_id, &on_item, &self.cancel)
                .await
                .map_err(exec_to_node_error),
            StreamMode::FireAndForget => {
                let engine = self.engine.clone();
                let run = self.run.clone();
                let scope = self.scope.clone();
                let node_id = self.node_id;
                let cancel = self.cancel.clone();
                let handle = tokio::spawn(async move {
                    engine.propagate_signal(&run, scope, node_id, &on_item, &cancel).await
                });
                self.pending_streams.lock().push(handle);
                Ok(())
            }
        }
    }

    fn get_variable(&self, key: &str) -> Option<SocketValue> {
        self.storage().get_variable(key)
    }

    fn set_variable(&self, key: &str, value: SocketValue) {
        self.storage().set_variable(key, value);
    }

    fn emit_feedback(&self, message: &str) {
        self.storage()
            .event_bus()
            .emit(nebula_eventbus::Event::Feedback {
                execution_id: self.run.execution_id,
                node_id: self.node_id,
                kind: nebula_eventbus::FeedbackKind::Info,
                message: message.to_string(),
            });
    }
}

fn exec_to_node_error(err: ExecError) -> NodeError {
    match err {
        ExecError::Cancelled => NodeError::Cancelled,
        ExecError::Node(_, cause) => cause,
        other => NodeError::fatal(other.to_string()),
    }
}
