//! # Nebula Node
//!
//! The node model: sockets, placed nodes ([`NodeData`]), connections, node
//! definitions with their builder, and the definition registry.
//!
//! Depends on `nebula-action` for the `Executor` trait a definition may
//! carry, but not the other way around — `ExecContext` addresses sockets by
//! `(NodeId, &str)` pairs rather than by `Socket`/`NodeDefinition`, so
//! `nebula-action` has no need of this crate.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Edges between node sockets.
pub mod connection;
/// Node definitions, their builder, and stream socket triplets.
pub mod definition;
/// Registry and lookup errors.
pub mod error;
/// Placed nodes: `Single` instances and nested `Group`s.
pub mod node;
/// Definition registry and catalog search.
pub mod registry;
/// Socket attributes: name, kind, side, type name, default value.
pub mod socket;

pub use connection::Connection;
pub use definition::{Builder as NodeDefinitionBuilder, DefinitionId, NodeDefinition, StreamTriplet};
pub use error::RegistryError;
pub use node::NodeData;
pub use registry::{CatalogEntry, DefinitionSource, NodeRegistry};
pub use socket::{Socket, SocketKind};

/// Common prelude for crates that build or inspect graphs.
pub mod prelude {
    pub use super::{
        CatalogEntry, Connection, DefinitionId, DefinitionSource, NodeData, NodeDefinition,
        NodeDefinitionBuilder, NodeRegistry, RegistryError, Socket, SocketKind, StreamTriplet,
    };
}
