//! Planner: turns `(nodes, connections)` into the indexed lookups the engine
//! drives off of.

use std::collections::HashMap;

use nebula_core::id::NodeId;
use nebula_node::{Connection, NodeData};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::PlanError;

/// A pre-computed plan over a flat node/connection list (one graph level —
/// a group's inner subgraph gets its own `Plan` when it executes).
#[derive(Debug)]
pub struct Plan {
    nodes: HashMap<NodeId, NodeData>,
    /// Connections landing on `(input_node, input_socket)`.
    incoming: HashMap<(NodeId, String), Vec<Connection>>,
    /// Connections leaving `(output_node, output_socket)`.
    outgoing: HashMap<(NodeId, String), Vec<Connection>>,
    /// Execution-initiator node ids, in declaration order.
    initiators: Vec<NodeId>,
    /// Topological pre-order over the pure-data dependency projection.
    topo_order: Vec<NodeId>,
}

impl Plan {
    /// Build a plan, validating node id uniqueness and the acyclicity of the
    /// data-only dependency projection (execution edges may cycle — that's
    /// how loops re-invoke their own node — but data edges may not).
    pub fn build(nodes: &[NodeData], connections: &[Connection]) -> Result<Self, PlanError> {
        let mut by_id = HashMap::with_capacity(nodes.len());
        let mut initiators = Vec::new();
        for node in nodes {
            if by_id.insert(node.id(), node.clone()).is_some() {
                return Err(PlanError::DuplicateNodeId(node.id()));
            }
            if node.is_execution_initiator() {
                initiators.push(node.id());
            }
        }

        let mut incoming: HashMap<(NodeId, String), Vec<Connection>> = HashMap::new();
        let mut outgoing: HashMap<(NodeId, String), Vec<Connection>> = HashMap::new();
        for conn in connections {
            incoming
                .entry((conn.input_node, conn.input_socket.clone()))
                .or_default()
                .push(conn.clone());
            outgoing
                .entry((conn.output_node, conn.output_socket.clone()))
                .or_default()
                .push(conn.clone());
        }

        let topo_order = topological_data_order(nodes, connections)?;

        Ok(Self {
            nodes: by_id,
            incoming,
            outgoing,
            initiators,
            topo_order,
        })
    }

    /// Look up a placed node by id.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(&id)
    }

    /// Connections feeding into `(node, socket)`.
    #[must_use]
    pub fn incoming(&self, node: NodeId, socket: &str) -> &[Connection] {
        self.incoming
            .get(&(node, socket.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Connections leaving `(node, socket)`.
    #[must_use]
    pub fn outgoing(&self, node: NodeId, socket: &str) -> &[Connection] {
        self.outgoing
            .get(&(node, socket.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The single inbound data connection for `(node, socket)`, if any. Per
    /// the data model's invariant a data input has at most one inbound data
    /// edge, so the first (and only) one found is returned.
    #[must_use]
    pub fn data_source(&self, node: NodeId, socket: &str) -> Option<&Connection> {
        self.incoming(node, socket).iter().find(|c| !c.is_execution)
    }

    /// Execution-initiator nodes, in declaration order.
    #[must_use]
    pub fn initiators(&self) -> &[NodeId] {
        &self.initiators
    }

    /// Topological pre-order over the data-only dependency projection, used
    /// by the parallel scheduler to respect producer/consumer ordering.
    #[must_use]
    pub fn topo_order(&self) -> &[NodeId] {
        &self.topo_order
    }

    /// Number of nodes in this plan.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether this plan has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn topological_data_order(
    nodes: &[NodeData],
    connections: &[Connection],
) -> Result<Vec<NodeId>, PlanError> {
    let mut graph = DiGraph::<NodeId, ()>::with_capacity(nodes.len(), connections.len());
    let mut index_of: HashMap<NodeId, NodeIndex> = HashMap::with_capacity(nodes.len());
    for node in nodes {
        let idx = graph.add_node(node.id());
        index_of.insert(node.id(), idx);
    }
    for conn in connections.iter().filter(|c| !c.is_execution) {
        if let (Some(&from), Some(&to)) = (index_of.get(&conn.output_node), index_of.get(&conn.input_node)) {
            graph.add_edge(from, to, ());
        }
    }

    toposort(&graph, None)
        .map(|order| order.into_iter().map(|idx| graph[idx]).collect())
        .map_err(|cycle| PlanError::DataCycle(graph[cycle.node_id()]))
}
