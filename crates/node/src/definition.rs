use std::sync::Arc;

pub use nebula_core::id::DefinitionId;
use nebula_action::Executor;
use nebula_core::Key;

use crate::node::NodeData;
use crate::socket::Socket;

/// Standard execution input socket name injected by [`Builder::callable`].
pub const ENTER: &str = "enter";
/// Standard execution output socket name injected by [`Builder::callable`]
/// and [`Builder::execution_initiator`].
pub const EXIT: &str = "exit";
/// Conventional execution output signalled by a loop-shaped node to run its
/// body for one more iteration, as opposed to signalling [`EXIT`] to stop.
/// Not injected by the builder — loop node definitions add it explicitly via
/// [`Builder::output`].
pub const LOOP_PATH: &str = "loop_path";

/// One data output plus the one or two execution outputs that make up a
/// stream socket triplet, as recorded by [`Builder::stream_output`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTriplet {
    pub item_socket: String,
    pub on_item_exec: String,
    pub completed_exec: Option<String>,
}

/// A node's static shape: category, description, socket template, and an
/// optional built-in executor.
///
/// `factory()` stamps out a fresh [`NodeData::Single`] with a new unique
/// [`nebula_core::NodeId`] every time it's called — placing the same
/// definition twice in a graph produces two independent nodes.
#[derive(Clone)]
pub struct NodeDefinition {
    id: DefinitionId,
    name: String,
    category: Key,
    description: String,
    inputs: Vec<Socket>,
    outputs: Vec<Socket>,
    callable: bool,
    execution_initiator: bool,
    stream_sockets: Vec<StreamTriplet>,
    executor: Option<Arc<dyn Executor>>,
}

impl NodeDefinition {
    #[must_use]
    pub fn builder(
        name: impl Into<String>,
        category: Key,
        description: impl Into<String>,
    ) -> Builder {
        Builder::new(name, category, description)
    }

    #[must_use]
    pub fn id(&self) -> DefinitionId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn category(&self) -> &Key {
        &self.category
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn inputs(&self) -> &[Socket] {
        &self.inputs
    }

    #[must_use]
    pub fn outputs(&self) -> &[Socket] {
        &self.outputs
    }

    #[must_use]
    pub fn stream_sockets(&self) -> &[StreamTriplet] {
        &self.stream_sockets
    }

    #[must_use]
    pub fn executor(&self) -> Option<&Arc<dyn Executor>> {
        self.executor.as_ref()
    }

    /// Stamp out a fresh placed node from this definition.
    #[must_use]
    pub fn factory(&self) -> NodeData {
        NodeData::Single {
            id: nebula_core::NodeId::v4(),
            name: self.name.clone(),
            definition_id: self.id,
            callable: self.callable,
            execution_initiator: self.execution_initiator,
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
        }
    }
}

fn push_dedup(sockets: &mut Vec<Socket>, socket: Socket) {
    if !sockets.iter().any(|s| s.name() == socket.name()) {
        sockets.push(socket);
    }
}

/// Fluent construction of a [`NodeDefinition`].
pub struct Builder {
    id: DefinitionId,
    name: String,
    category: Key,
    description: String,
    inputs: Vec<Socket>,
    outputs: Vec<Socket>,
    callable: bool,
    execution_initiator: bool,
    stream_sockets: Vec<StreamTriplet>,
    executor: Option<Arc<dyn Executor>>,
}

impl Builder {
    #[must_use]
    pub fn new(name: impl Into<String>, category: Key, description: impl Into<String>) -> Self {
        Self {
            id: DefinitionId::v4(),
            name: name.into(),
            category,
            description: description.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            callable: false,
            execution_initiator: false,
            stream_sockets: Vec::new(),
            executor: None,
        }
    }

    /// This node accepts an incoming execution signal: adds an `Enter` exec
    /// input and an `Exit` exec output.
    #[must_use]
    pub fn callable(mut self) -> Self {
        self.callable = true;
        push_dedup(&mut self.inputs, Socket::exec_input(ENTER));
        push_dedup(&mut self.outputs, Socket::exec_output(EXIT));
        self
    }

    /// This node starts an execution chain on its own: adds only an `Exit`
    /// exec output.
    #[must_use]
    pub fn execution_initiator(mut self) -> Self {
        self.execution_initiator = true;
        push_dedup(&mut self.outputs, Socket::exec_output(EXIT));
        self
    }

    #[must_use]
    pub fn input(mut self, socket: Socket) -> Self {
        push_dedup(&mut self.inputs, socket);
        self
    }

    #[must_use]
    pub fn output(mut self, socket: Socket) -> Self {
        push_dedup(&mut self.outputs, socket);
        self
    }

    /// Adds a data output `item` plus one execution output `on_item`
    /// (signalled once per emitted item) and, if given, a second `completed`
    /// execution output (signalled once when the producer finishes).
    #[must_use]
    pub fn stream_output(
        mut self,
        item: impl Into<String>,
        on_item: impl Into<String>,
        completed: Option<&str>,
    ) -> Self {
        let item = item.into();
        let on_item = on_item.into();
        push_dedup(&mut self.outputs, Socket::data_output(item.clone(), "json"));
        push_dedup(&mut self.outputs, Socket::exec_output(on_item.clone()));
        if let Some(completed) = completed {
            push_dedup(&mut self.outputs, Socket::exec_output(completed));
        }
        self.stream_sockets.push(StreamTriplet {
            item_socket: item,
            on_item_exec: on_item,
            completed_exec: completed.map(str::to_string),
        });
        self
    }

    /// Attach the inline executor this definition's factory-produced nodes
    /// run. Builtin nodes set this directly; user-defined nodes may leave it
    /// unset and have the engine resolve an executor some other way.
    #[must_use]
    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    #[must_use]
    pub fn build(self) -> NodeDefinition {
        NodeDefinition {
            id: self.id,
            name: self.name,
            category: self.category,
            description: self.description,
            inputs: self.inputs,
            outputs: self.outputs,
            callable: self.callable,
            execution_initiator: self.execution_initiator,
            stream_sockets: self.stream_sockets,
            executor: self.executor,
        }
    }
}
