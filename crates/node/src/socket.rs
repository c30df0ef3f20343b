use nebula_value::SocketValue;

/// Whether a socket carries data or propagates control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    /// Carries a typed value along a data edge.
    Data,
    /// One-shot control-flow signal along an execution edge.
    Execution,
}

/// A named port on a node.
///
/// `name` is unique within its side (inputs or outputs) of a single node.
/// Data sockets carry a `type_name` used to validate connections and an
/// optional default value used when no upstream connection supplies one.
#[derive(Debug, Clone, PartialEq)]
pub struct Socket {
    name: String,
    kind: SocketKind,
    is_input: bool,
    type_name: String,
    default_value: Option<SocketValue>,
}

impl Socket {
    /// A data input socket.
    #[must_use]
    pub fn data_input(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SocketKind::Data,
            is_input: true,
            type_name: type_name.into(),
            default_value: None,
        }
    }

    /// A data output socket.
    #[must_use]
    pub fn data_output(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SocketKind::Data,
            is_input: false,
            type_name: type_name.into(),
            default_value: None,
        }
    }

    /// An execution input socket.
    #[must_use]
    pub fn exec_input(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SocketKind::Execution,
            is_input: true,
            type_name: "exec".to_string(),
            default_value: None,
        }
    }

    /// An execution output socket.
    #[must_use]
    pub fn exec_output(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SocketKind::Execution,
            is_input: false,
            type_name: "exec".to_string(),
            default_value: None,
        }
    }

    /// Attach a default value, used when a data input has no incoming
    /// connection. No-op on execution sockets.
    #[must_use]
    pub fn with_default(mut self, value: SocketValue) -> Self {
        self.default_value = Some(value);
        self
    }

    /// The socket's name, unique within its side of the node.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Data or execution.
    #[must_use]
    pub fn kind(&self) -> SocketKind {
        self.kind
    }

    #[must_use]
    pub fn is_input(&self) -> bool {
        self.is_input
    }

    #[must_use]
    pub fn is_execution(&self) -> bool {
        self.kind == SocketKind::Execution
    }

    /// The fully qualified type name this socket's values carry. `"exec"`
    /// for execution sockets.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    #[must_use]
    pub fn default_value(&self) -> Option<&SocketValue> {
        self.default_value.as_ref()
    }
}
