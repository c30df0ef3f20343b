//! Shared state threaded through one `execute`/`execute_group` call.

use std::sync::Arc;

use dashmap::DashSet;
use nebula_core::id::{ExecutionId, NodeId};
use nebula_execution::Plan;
use nebula_node::NodeRegistry;
use nebula_storage::Storage;

use crate::gate::StepGate;
use crate::metrics::EngineMetrics;
use crate::options::ExecutionOptions;

/// Everything constant for the lifetime of one top-level `execute` call,
/// shared by every recursive invocation it spawns (including nested group
/// executions, which reuse the same `RunState` rather than starting a new
/// one).
pub(crate) struct RunState {
    pub(crate) registry: Arc<NodeRegistry>,
    pub(crate) metrics: Arc<EngineMetrics>,
    pub(crate) execution_id: ExecutionId,
    pub(crate) options: ExecutionOptions,
    pub(crate) gate: Arc<StepGate>,
    pub(crate) user_ctx: serde_json::Value,
    /// Nodes currently being pulled for their data outputs, across every
    /// scope. Guards against a data-resolution cycle that spans a group
    /// boundary (and so isn't visible to either side's own `Plan::build`
    /// acyclicity check).
    pub(crate) active_pulls: Arc<DashSet<NodeId>>,
}

/// The graph and storage layer a node is currently scheduled against.
///
/// Changes at two points: a loop iteration's body runs under a fresh child
/// [`Storage`] layer with the same `plan`; a group's inner subgraph runs
/// under both a fresh layer and a freshly built inner `Plan`.
#[derive(Clone)]
pub(crate) struct Scope {
    pub(crate) plan: Arc<Plan>,
    pub(crate) storage: Arc<dyn Storage>,
}
