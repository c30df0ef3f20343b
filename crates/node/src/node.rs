use nebula_core::id::{GroupId, NodeId};

use crate::connection::Connection;
use crate::definition::DefinitionId;
use crate::socket::Socket;

/// A node placed in a graph.
///
/// `Single` is an instance of a `NodeDefinition`: `definition_id` points back
/// at the definition that produced it, and `inputs`/`outputs` are a frozen
/// copy of the definition's socket template at the time the node was placed
/// (later definition edits don't retroactively change already-placed nodes).
///
/// `Group` nests a subgraph: its own nodes and connections, plus mapping
/// tables from the group's own boundary sockets to sockets on nodes inside
/// it. The planner and engine treat a `Group` as an opaque node with its own
/// execution (`execute_group`), not by inlining its subgraph into the parent.
#[derive(Debug, Clone)]
pub enum NodeData {
    Single {
        id: NodeId,
        name: String,
        definition_id: DefinitionId,
        callable: bool,
        execution_initiator: bool,
        inputs: Vec<Socket>,
        outputs: Vec<Socket>,
    },
    Group {
        id: NodeId,
        name: String,
        group_id: GroupId,
        nodes: Vec<NodeData>,
        connections: Vec<Connection>,
        /// Group boundary socket name -> (inner node id, inner socket name).
        input_mapping: Vec<(String, NodeId, String)>,
        /// Group boundary socket name -> (inner node id, inner socket name).
        output_mapping: Vec<(String, NodeId, String)>,
        inputs: Vec<Socket>,
        outputs: Vec<Socket>,
    },
}

impl NodeData {
    #[must_use]
    pub fn id(&self) -> NodeId {
        match self {
            Self::Single { id, .. } | Self::Group { id, .. } => *id,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Single { name, .. } | Self::Group { name, .. } => name,
        }
    }

    #[must_use]
    pub fn inputs(&self) -> &[Socket] {
        match self {
            Self::Single { inputs, .. } | Self::Group { inputs, .. } => inputs,
        }
    }

    #[must_use]
    pub fn outputs(&self) -> &[Socket] {
        match self {
            Self::Single { outputs, .. } | Self::Group { outputs, .. } => outputs,
        }
    }

    #[must_use]
    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group { .. })
    }

    /// Whether this node accepts an incoming execution signal (has an
    /// `Enter` input and therefore must be reached by an execution edge or
    /// by being an initiator).
    #[must_use]
    pub fn is_callable(&self) -> bool {
        match self {
            Self::Single { callable, .. } => *callable,
            Self::Group { .. } => true,
        }
    }

    /// Whether this node starts an execution chain on its own, without
    /// needing an incoming execution edge.
    #[must_use]
    pub fn is_execution_initiator(&self) -> bool {
        match self {
            Self::Single {
                execution_initiator,
                ..
            } => *execution_initiator,
            Self::Group { .. } => false,
        }
    }

    #[must_use]
    pub fn find_input(&self, name: &str) -> Option<&Socket> {
        self.inputs().iter().find(|s| s.name() == name)
    }

    #[must_use]
    pub fn find_output(&self, name: &str) -> Option<&Socket> {
        self.outputs().iter().find(|s| s.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn single(callable: bool, initiator: bool) -> NodeData {
        NodeData::Single {
            id: NodeId::v4(),
            name: "add".to_string(),
            definition_id: DefinitionId::v4(),
            callable,
            execution_initiator: initiator,
            inputs: vec![Socket::data_input("a", "int"), Socket::data_input("b", "int")],
            outputs: vec![Socket::data_output("sum", "int")],
        }
    }

    #[test]
    fn single_node_exposes_sockets() {
        let node = single(true, false);
        assert!(node.find_input("a").is_some());
        assert!(node.find_output("sum").is_some());
        assert!(node.find_input("missing").is_none());
    }

    #[test]
    fn callable_and_initiator_flags_come_from_single_variant() {
        let node = single(true, false);
        assert!(node.is_callable());
        assert!(!node.is_execution_initiator());

        let initiator = single(false, true);
        assert!(!initiator.is_callable());
        assert!(initiator.is_execution_initiator());
    }

    #[test]
    fn group_node_is_always_callable_and_never_an_initiator() {
        let group = NodeData::Group {
            id: NodeId::v4(),
            name: "subgraph".to_string(),
            group_id: GroupId::v4(),
            nodes: vec![],
            connections: vec![],
            input_mapping: vec![],
            output_mapping: vec![],
            inputs: vec![],
            outputs: vec![],
        };
        assert!(group.is_group());
        assert!(group.is_callable());
        assert!(!group.is_execution_initiator());
    }

    #[test]
    fn id_and_name_accessors_work_across_variants() {
        let node = single(true, false);
        let id = node.id();
        assert_eq!(node.name(), "add");
        assert_eq!(id, node.id());
    }
}
