use nebula_core::id::NodeId;

/// An edge between two sockets: `output_node.output_socket ->
/// input_node.input_socket`.
///
/// `is_execution` mirrors the kind of both endpoint sockets (a connection
/// never mixes a data socket with an execution socket); it is recorded
/// directly on the connection so the planner can partition edges without
/// re-resolving both sockets for every lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Connection {
    pub output_node: NodeId,
    pub output_socket: String,
    pub input_node: NodeId,
    pub input_socket: String,
    pub is_execution: bool,
}

impl Connection {
    #[must_use]
    pub fn data(
        output_node: NodeId,
        output_socket: impl Into<String>,
        input_node: NodeId,
        input_socket: impl Into<String>,
    ) -> Self {
        Self {
            output_node,
            output_socket: output_socket.into(),
            input_node,
            input_socket: input_socket.into(),
            is_execution: false,
        }
    }

    #[must_use]
    pub fn execution(
        output_node: NodeId,
        output_socket: impl Into<String>,
        input_node: NodeId,
        input_socket: impl Into<String>,
    ) -> Self {
        Self {
            output_node,
            output_socket: output_socket.into(),
            input_node,
            input_socket: input_socket.into(),
            is_execution: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn data_connection_is_not_execution() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let conn = Connection::data(a, "out", b, "in");
        assert!(!conn.is_execution);
        assert_eq!(conn.output_node, a);
        assert_eq!(conn.input_node, b);
    }

    #[test]
    fn execution_connection_flag_is_set() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let conn = Connection::execution(a, "exec_out", b, "enter");
        assert!(conn.is_execution);
    }
}
