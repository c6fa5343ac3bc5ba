//! Command Registry & Dispatch (spec.md §4.3).

pub mod builtins;
pub mod dispatch;
pub mod registry;
pub mod types;

pub use dispatch::bind_command;
pub use registry::{CommandRegistry, CompiledCommand};
pub use types::{ArgDescriptor, CommandArgs, CommandFn, CommandSpec};
