//! # Nebula Nodes
//!
//! Built-in control, data, loop, and debug node definitions: the minimal
//! vocabulary a graph needs to express branching, iteration, timing, and
//! simple arithmetic without reaching for a plugin. [`register_builtins`]
//! registers every node this crate defines into a [`NodeRegistry`].
//!
//! Loop nodes (`ForEach`, `While`, `DoWhile`, `RepeatUntil`, `ForLoopStep`,
//! `ParallelForEach`) hold their iteration state in storage variables keyed
//! by their own node id, and signal `loop_path` or `exit` once per
//! invocation — the engine re-invokes the node itself for the next
//! iteration (see `nebula_node::definition::LOOP_PATH`); the node body never
//! loops internally.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Arithmetic and value-producing nodes: `Const`, `Add`, `Consume`.
pub mod values;
/// Flow-control and debug nodes: `Start`, `Branch`, `Marker`, `Delay`.
pub mod control;
/// Iteration nodes driven by the engine's loop re-invocation protocol.
pub mod loops;

use nebula_node::{NodeRegistry, RegistryError};

/// Register every built-in node definition into `registry`.
pub fn register_builtins(registry: &mut NodeRegistry) -> Result<(), RegistryError> {
    registry.register(values::const_definition())?;
    registry.register(values::add_definition())?;
    registry.register(values::consume_definition())?;

    registry.register(control::start_definition())?;
    registry.register(control::branch_definition())?;
    registry.register(control::marker_definition())?;
    registry.register(control::delay_definition())?;

    registry.register(loops::for_each_definition())?;
    registry.register(loops::while_definition())?;
    registry.register(loops::do_while_definition())?;
    registry.register(loops::repeat_until_definition())?;
    registry.register(loops::for_loop_step_definition())?;
    registry.register(loops::parallel_for_each_definition())?;

    Ok(())
}
