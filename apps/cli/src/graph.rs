//! Loading a persisted graph into the shapes `nebula_engine::Engine::execute`
//! wants.
//!
//! `NodeData`/`Connection` aren't `serde`-derived — they're runtime shapes
//! stamped out of a [`NodeRegistry`] via [`NodeDefinition::factory`], not a
//! wire format. [`GraphEnvelope`] is the wire format instead: a human
//! readable JSON document that names nodes by definition and local string
//! id, resolved against the registry at load time.

use std::collections::HashMap;
use std::path::Path;

use nebula_core::id::NodeId;
use nebula_node::{Connection, NodeData, NodeRegistry, Socket};
use nebula_value::SocketValue;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The only envelope version this build understands.
pub const CURRENT_VERSION: u32 = 1;

/// `(variable key, seed value)` pairs applied to the run's root storage
/// before execution starts.
pub type VariableSeed = Vec<(String, serde_json::Value)>;

/// Errors loading or resolving a [`GraphEnvelope`].
#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to read graph file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse graph file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("graph envelope version {found} is newer than the {supported} this build supports")]
    Unsupported { found: u32, supported: u32 },

    #[error("node '{node_id}' references unknown definition '{definition}'")]
    UnknownDefinition { node_id: String, definition: String },

    #[error("duplicate node id '{0}' in graph file")]
    DuplicateNodeId(String),

    #[error("failed to box value for node '{node_id}' input '{socket}': {source}")]
    Value {
        node_id: String,
        socket: String,
        #[source]
        source: nebula_value::ValueError,
    },
}

/// The versioned persistence shape named in the graph persistence design:
/// `{ version, nodes, connections, viewport, variables }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEnvelope {
    pub version: u32,
    pub nodes: Vec<NodeEnvelope>,
    #[serde(default)]
    pub connections: Vec<ConnectionEnvelope>,
    /// Editor camera/pan state. Opaque to execution; round-tripped only.
    #[serde(default)]
    pub viewport: serde_json::Value,
    #[serde(default)]
    pub variables: Vec<VariableEnvelope>,
}

/// One placed node: `id` is a caller-chosen string local to this file,
/// `definition` names a registered [`nebula_node::NodeDefinition`] by its
/// `name()`, and `inputs` overrides that definition's per-socket defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeEnvelope {
    pub id: String,
    pub definition: String,
    #[serde(default)]
    pub inputs: HashMap<String, serde_json::Value>,
}

/// One edge, referencing nodes by their [`NodeEnvelope::id`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionEnvelope {
    pub from_node: String,
    pub from_socket: String,
    pub to_node: String,
    pub to_socket: String,
    #[serde(default)]
    pub execution: bool,
}

/// A seed variable applied to the root storage scope before the run starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableEnvelope {
    pub key: String,
    pub value: serde_json::Value,
}

/// Where a `graph run` invocation gets its `(nodes, connections,
/// variables)` from. `JsonGraphSource` is the only implementation in this
/// build; the trait exists so a future persistence backend (a database, a
/// remote store) can be swapped in without touching the CLI's run path.
pub trait GraphSource {
    /// Load and resolve the graph at `path` against `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`CliError`] if the file can't be read or parsed, names an
    /// envelope version newer than this build supports, or references a
    /// node definition the registry doesn't have.
    fn load(
        &self,
        path: &Path,
        registry: &NodeRegistry,
    ) -> Result<(Vec<NodeData>, Vec<Connection>, VariableSeed), CliError>;
}

/// Reads a [`GraphEnvelope`] from a JSON file.
///
/// Envelope versions below [`CURRENT_VERSION`] are accepted as-is — there is
/// only one version in this build, so "migrating" one forward is a no-op.
/// Versions above it are rejected with [`CliError::Unsupported`], matching
/// the persistence design's "rejects versions above with `Unsupported`".
pub struct JsonGraphSource;

impl GraphSource for JsonGraphSource {
    fn load(
        &self,
        path: &Path,
        registry: &NodeRegistry,
    ) -> Result<(Vec<NodeData>, Vec<Connection>, VariableSeed), CliError> {
        let text = std::fs::read_to_string(path)?;
        let envelope: GraphEnvelope = serde_json::from_str(&text)?;

        if envelope.version > CURRENT_VERSION {
            return Err(CliError::Unsupported {
                found: envelope.version,
                supported: CURRENT_VERSION,
            });
        }

        let definitions_by_name: HashMap<&str, _> = registry
            .definitions()
            .into_iter()
            .map(|def| (leak_name(def.name()), def))
            .collect();

        let mut placed = Vec::with_capacity(envelope.nodes.len());
        let mut id_map: HashMap<String, NodeId> = HashMap::with_capacity(envelope.nodes.len());

        for node_env in &envelope.nodes {
            if id_map.contains_key(&node_env.id) {
                return Err(CliError::DuplicateNodeId(node_env.id.clone()));
            }
            let definition = definitions_by_name
                .get(node_env.definition.as_str())
                .ok_or_else(|| CliError::UnknownDefinition {
                    node_id: node_env.id.clone(),
                    definition: node_env.definition.clone(),
                })?;

            let mut instance = definition.factory();
            apply_input_overrides(&mut instance, node_env)?;

            id_map.insert(node_env.id.clone(), instance.id());
            placed.push(instance);
        }

        let mut connections = Vec::with_capacity(envelope.connections.len());
        for conn in &envelope.connections {
            let (Some(&from), Some(&to)) = (id_map.get(&conn.from_node), id_map.get(&conn.to_node)) else {
                tracing::warn!(
                    from = %conn.from_node,
                    to = %conn.to_node,
                    "dropping connection referencing unknown node id",
                );
                continue;
            };
            connections.push(if conn.execution {
                Connection::execution(from, conn.from_socket.as_str(), to, conn.to_socket.as_str())
            } else {
                Connection::data(from, conn.from_socket.as_str(), to, conn.to_socket.as_str())
            });
        }

        let variables = envelope
            .variables
            .into_iter()
            .map(|v| (v.key, v.value))
            .collect();

        Ok((placed, connections, variables))
    }
}

/// Overwrite `instance`'s input sockets named in `node_env.inputs` with
/// boxed defaults, leaving every other socket (and every output) as the
/// definition's template produced them.
fn apply_input_overrides(instance: &mut NodeData, node_env: &NodeEnvelope) -> Result<(), CliError> {
    let NodeData::Single { inputs, .. } = instance else {
        return Ok(());
    };
    for (socket_name, value) in &node_env.inputs {
        let boxed = SocketValue::from_value(value).map_err(|source| CliError::Value {
            node_id: node_env.id.clone(),
            socket: socket_name.clone(),
            source,
        })?;
        if let Some(existing) = inputs.iter_mut().find(|s| s.name() == socket_name) {
            let type_name = existing.type_name().to_string();
            *existing = Socket::data_input(socket_name.clone(), type_name).with_default(boxed);
        } else {
            inputs.push(Socket::data_input(socket_name.clone(), "json").with_default(boxed));
        }
    }
    Ok(())
}

/// Leak a definition's name so it can key a borrow-free lookup table built
/// once per `load` call. Bounded by the registry's (small, process-lifetime)
/// set of built-in definitions.
fn leak_name(name: &str) -> &'static str {
    Box::leak(name.to_string().into_boxed_str())
}
