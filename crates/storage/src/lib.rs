//! Layered runtime storage for a single execution.
//!
//! [`RuntimeStorage`] is the root: it owns the event bus and the generation
//! counter for an entire `execute` call. [`LayeredStorage`] wraps a parent
//! (the root, or another layer) for nested scopes — loop iterations, group
//! executions — with read-through for socket values and variables but a
//! strictly local executed-set, so each nested scope re-executes its own
//! nodes. Local writes never mutate the parent; the parent stays observable
//! to sibling scopes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::{DashMap, DashSet};
use nebula_core::id::NodeId;
use nebula_eventbus::EventBus;
use nebula_value::SocketValue;

/// The storage operations the engine and node bodies perform against a
/// scope, whether it's the execution root or a nested layer.
pub trait Storage: Send + Sync {
    /// Read a data output previously written for `(node, socket)`.
    fn get_socket_value(&self, node: NodeId, socket: &str) -> Option<SocketValue>;

    /// Write a data output for `(node, socket)` in this scope.
    fn set_socket_value(&self, node: NodeId, socket: &str, value: SocketValue);

    /// Like [`get_socket_value`](Self::get_socket_value), but also reports
    /// whether the value was actually found (versus absent).
    fn try_get_socket_value(&self, node: NodeId, socket: &str) -> (SocketValue, bool) {
        match self.get_socket_value(node, socket) {
            Some(value) => (value, true),
            None => (SocketValue::null(), false),
        }
    }

    /// Whether `node` has already executed in this scope. Strictly local:
    /// a [`LayeredStorage`] never consults its parent, so nested scopes
    /// re-execute every node they contain.
    fn is_node_executed(&self, node: NodeId) -> bool;

    /// Record `node` as executed in this scope.
    fn mark_node_executed(&self, node: NodeId);

    /// Remove `nodes` from this scope's executed-set, allowing them to run
    /// again (used by loop bodies between iterations).
    fn clear_node_executed(&self, nodes: &[NodeId]);

    /// Read a variable, falling through to the parent scope if unset here.
    fn get_variable(&self, key: &str) -> Option<SocketValue>;

    /// Write a variable in this scope.
    fn set_variable(&self, key: &str, value: SocketValue);

    /// Enter a nested generation (scope depth), returning the new depth.
    fn push_generation(&self) -> u64;

    /// Leave the current generation, returning the depth after popping.
    fn pop_generation(&self) -> u64;

    /// The current generation (scope depth).
    fn current_generation(&self) -> u64;

    /// The event bus shared by the whole execution, root or layer alike.
    fn event_bus(&self) -> &EventBus;

    /// A handle to the generation counter shared by this scope and every
    /// layer chained to it. Used by [`create_child`] to wire a new layer
    /// into the same counter without needing to downcast `self`.
    fn generation_handle(&self) -> Arc<AtomicU64>;

    /// This layer's diagnostic label. Empty for the root.
    fn label(&self) -> &str {
        ""
    }
}

/// Create a scope chained to `parent` — the root, or another layer.
///
/// `label` is purely diagnostic (surfaced in `Debug`/`label()`, not used for
/// lookups). The new layer shares `parent`'s generation counter, reads
/// through to it for socket values and variables, and keeps its own
/// executed-set strictly local.
#[must_use]
pub fn create_child(parent: Arc<dyn Storage>, label: impl Into<String>) -> Arc<dyn Storage> {
    let generation = parent.generation_handle();
    Arc::new(LayeredStorage::new(parent, generation, label))
}

struct GenerationCounter(Arc<AtomicU64>);

impl GenerationCounter {
    fn new() -> Self {
        Self(Arc::new(AtomicU64::new(0)))
    }

    fn push(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn pop(&self) -> u64 {
        let prev = self.0.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |g| {
            Some(g.saturating_sub(1))
        });
        prev.unwrap_or(0).saturating_sub(1)
    }

    fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    fn share(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.0)
    }
}

/// The root storage for one `execute` call.
///
/// Owns the event bus and the generation counter for the whole execution;
/// every [`LayeredStorage`] created from it (directly or transitively)
/// shares both.
pub struct RuntimeStorage {
    values: DashMap<(NodeId, String), SocketValue>,
    executed: DashSet<NodeId>,
    variables: DashMap<String, SocketValue>,
    event_bus: EventBus,
    generation: GenerationCounter,
}

impl RuntimeStorage {
    /// A fresh root storage backed by the given event bus.
    #[must_use]
    pub fn new(event_bus: EventBus) -> Self {
        Self {
            values: DashMap::new(),
            executed: DashSet::new(),
            variables: DashMap::new(),
            event_bus,
            generation: GenerationCounter::new(),
        }
    }
}

impl Storage for RuntimeStorage {
    fn get_socket_value(&self, node: NodeId, socket: &str) -> Option<SocketValue> {
        self.values.get(&(node, socket.to_string())).map(|v| v.clone())
    }

    fn set_socket_value(&self, node: NodeId, socket: &str, value: SocketValue) {
        self.values.insert((node, socket.to_string()), value);
    }

    fn is_node_executed(&self, node: NodeId) -> bool {
        self.executed.contains(&node)
    }

    fn mark_node_executed(&self, node: NodeId) {
        self.executed.insert(node);
    }

    fn clear_node_executed(&self, nodes: &[NodeId]) {
        for node in nodes {
            self.executed.remove(node);
        }
    }

    fn get_variable(&self, key: &str) -> Option<SocketValue> {
        self.variables.get(key).map(|v| v.clone())
    }

    fn set_variable(&self, key: &str, value: SocketValue) {
        self.variables.insert(key.to_string(), value);
    }

    fn push_generation(&self) -> u64 {
        self.generation.push()
    }

    fn pop_generation(&self) -> u64 {
        self.generation.pop()
    }

    fn current_generation(&self) -> u64 {
        self.generation.current()
    }

    fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    fn generation_handle(&self) -> Arc<AtomicU64> {
        self.generation.share()
    }
}

/// A nested scope chained to a parent [`Storage`].
///
/// Reads for socket values and variables fall through to the parent when
/// this layer has no entry of its own. The executed-set never does — it is
/// local to this layer so a loop body or group re-executes its nodes on
/// every pass. Writes are always local; a layer can never mutate its
/// parent.
pub struct LayeredStorage {
    label: String,
    parent: Arc<dyn Storage>,
    values: DashMap<(NodeId, String), SocketValue>,
    executed: DashSet<NodeId>,
    variables: DashMap<String, SocketValue>,
    generation: Arc<AtomicU64>,
}

impl LayeredStorage {
    fn new(parent: Arc<dyn Storage>, generation: Arc<AtomicU64>, label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            parent,
            values: DashMap::new(),
            executed: DashSet::new(),
            variables: DashMap::new(),
            generation,
        }
    }
}

impl Storage for LayeredStorage {
    fn get_socket_value(&self, node: NodeId, socket: &str) -> Option<SocketValue> {
        self.values
            .get(&(node, socket.to_string()))
            .map(|v| v.clone())
            .or_else(|| self.parent.get_socket_value(node, socket))
    }

    fn set_socket_value(&self, node: NodeId, socket: &str, value: SocketValue) {
        self.values.insert((node, socket.to_string()), value);
    }

    fn is_node_executed(&self, node: NodeId) -> bool {
        self.executed.contains(&node)
    }

    fn mark_node_executed(&self, node: NodeId) {
        self.executed.insert(node);
    }

    fn clear_node_executed(&self, nodes: &[NodeId]) {
        for node in nodes {
            self.executed.remove(node);
        }
    }

    fn get_variable(&self, key: &str) -> Option<SocketValue> {
        self.variables
            .get(key)
            .map(|v| v.clone())
            .or_else(|| self.parent.get_variable(key))
    }

    fn set_variable(&self, key: &str, value: SocketValue) {
        self.variables.insert(key.to_string(), value);
    }

    fn push_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn pop_generation(&self) -> u64 {
        let prev = self
            .generation
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |g| {
                Some(g.saturating_sub(1))
            });
        prev.unwrap_or(0).saturating_sub(1)
    }

    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn event_bus(&self) -> &EventBus {
        self.parent.event_bus()
    }

    fn generation_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.generation)
    }

    fn label(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn boxed(n: i64) -> SocketValue {
        SocketValue::from_value(&n).unwrap()
    }

    #[test]
    fn root_socket_value_round_trips() {
        let storage = RuntimeStorage::new(EventBus::new(16));
        let node = NodeId::v4();
        storage.set_socket_value(node, "out", boxed(7));
        assert_eq!(storage.get_socket_value(node, "out"), Some(boxed(7)));
    }

    #[test]
    fn try_get_reports_found_flag() {
        let storage = RuntimeStorage::new(EventBus::new(16));
        let node = NodeId::v4();
        let (value, found) = storage.try_get_socket_value(node, "missing");
        assert!(!found);
        assert!(value.is_null());

        storage.set_socket_value(node, "out", boxed(1));
        let (value, found) = storage.try_get_socket_value(node, "out");
        assert!(found);
        assert_eq!(value, boxed(1));
    }

    #[test]
    fn executed_set_tracks_nodes() {
        let storage = RuntimeStorage::new(EventBus::new(16));
        let node = NodeId::v4();
        assert!(!storage.is_node_executed(node));
        storage.mark_node_executed(node);
        assert!(storage.is_node_executed(node));
        storage.clear_node_executed(&[node]);
        assert!(!storage.is_node_executed(node));
    }

    #[test]
    fn child_reads_through_to_parent_for_values_and_variables() {
        let root = Arc::new(RuntimeStorage::new(EventBus::new(16)));
        let node = NodeId::v4();
        root.set_socket_value(node, "out", boxed(42));
        root.set_variable("count", boxed(1));

        let child = create_child(root.clone(), "iteration-0");
        assert_eq!(child.get_socket_value(node, "out"), Some(boxed(42)));
        assert_eq!(child.get_variable("count"), Some(boxed(1)));
    }

    #[test]
    fn child_writes_never_mutate_parent() {
        let root = Arc::new(RuntimeStorage::new(EventBus::new(16)));
        let node = NodeId::v4();
        let child = create_child(root.clone(), "iteration-0");
        child.set_socket_value(node, "out", boxed(99));
        child.set_variable("count", boxed(5));

        assert_eq!(root.get_socket_value(node, "out"), None);
        assert_eq!(root.get_variable("count"), None);
    }

    #[test]
    fn child_local_value_shadows_parent() {
        let root = Arc::new(RuntimeStorage::new(EventBus::new(16)));
        let node = NodeId::v4();
        root.set_socket_value(node, "out", boxed(1));

        let child = create_child(root.clone(), "iteration-0");
        child.set_socket_value(node, "out", boxed(2));
        assert_eq!(child.get_socket_value(node, "out"), Some(boxed(2)));
        assert_eq!(root.get_socket_value(node, "out"), Some(boxed(1)));
    }

    #[test]
    fn executed_set_is_strictly_local_to_each_layer() {
        let root = Arc::new(RuntimeStorage::new(EventBus::new(16)));
        let node = NodeId::v4();
        root.mark_node_executed(node);

        let child = create_child(root.clone(), "iteration-0");
        assert!(!child.is_node_executed(node), "child must re-execute nodes the parent already ran");
    }

    #[test]
    fn generation_counter_is_shared_across_layers() {
        let root = Arc::new(RuntimeStorage::new(EventBus::new(16)));
        assert_eq!(root.current_generation(), 0);
        assert_eq!(root.push_generation(), 1);

        let child = create_child(root.clone(), "loop-body");
        assert_eq!(child.current_generation(), 1);
        assert_eq!(child.push_generation(), 2);
        assert_eq!(root.current_generation(), 2);

        assert_eq!(child.pop_generation(), 1);
        assert_eq!(root.current_generation(), 1);
    }

    #[test]
    fn nested_children_chain_read_through_recursively() {
        let root = Arc::new(RuntimeStorage::new(EventBus::new(16)));
        let node = NodeId::v4();
        root.set_socket_value(node, "out", boxed(10));

        let child = create_child(root.clone(), "outer");
        let grandchild = create_child(child, "inner");
        assert_eq!(grandchild.get_socket_value(node, "out"), Some(boxed(10)));
    }

    #[test]
    fn event_bus_is_shared_with_children() {
        let root = Arc::new(RuntimeStorage::new(EventBus::new(16)));
        let child = create_child(root.clone(), "iteration-0");
        child.event_bus().emit(nebula_eventbus::Event::ExecutionStarted {
            execution_id: nebula_core::id::ExecutionId::v4(),
        });
        assert_eq!(root.event_bus().total_emitted(), 1);
    }

    #[test]
    fn label_is_diagnostic_only() {
        let root = Arc::new(RuntimeStorage::new(EventBus::new(16)));
        let child = create_child(root, "iteration-3");
        assert_eq!(child.label(), "iteration-3");
    }
}
