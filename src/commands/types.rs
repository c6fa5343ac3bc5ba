//! Command Registry types (spec.md §3 "Command", §4.3).
//!
//! Shaped after the teacher's `commands/types.rs`
//! (`Command` trait + `CommandContext`/`CommandResult`), adapted from
//! "filesystem command" to "argument-schema + flag-table command".

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::EngineErrorPayload;
use crate::scope::Scope;
use crate::value::Value;

/// One positional argument descriptor (spec.md §3 "Command" record).
#[derive(Clone, Debug)]
pub struct ArgDescriptor {
    pub name: String,
    pub required: bool,
    pub variadic: bool,
    pub default: Option<Value>,
}

impl ArgDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), required: false, variadic: false, default: None }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    pub fn default_value(mut self, v: Value) -> Self {
        self.default = Some(v);
        self
    }
}

/// Reserved argument names, bound implicitly by the dispatcher rather than
/// drained from tokens.
pub const ARG_SCOPE: &str = "scope";
pub const ARG_MODE: &str = "mode";

/// Everything a command callback receives once binding (spec.md §4.3) has
/// completed: the resolved named arguments (including the collected
/// variadic tail as a `Value::Seq`), the accumulated flag bit-mask, and the
/// scope the call was made in.
pub struct CommandArgs {
    pub values: IndexMap<String, Value>,
    pub mode: u64,
    pub scope: Scope,
}

impl CommandArgs {
    pub fn get(&self, name: &str) -> Value {
        self.values.get(name).cloned().unwrap_or(Value::Undefined)
    }
}

pub type CommandResult = Result<Value, EngineErrorPayload>;

pub type CommandFn =
    Arc<dyn Fn(CommandArgs) -> Pin<Box<dyn Future<Output = CommandResult> + Send>> + Send + Sync>;

/// A registered command: name, callback, optional flag table (single
/// character → bit-weight), and ordered argument descriptors. At most one
/// argument is variadic, and it must be last (spec.md §3 invariant).
#[derive(Clone)]
pub struct CommandSpec {
    pub name: String,
    pub flags: HashMap<char, u64>,
    pub args: Vec<ArgDescriptor>,
    pub callback: CommandFn,
}

impl CommandSpec {
    pub fn new(name: impl Into<String>, callback: CommandFn) -> Self {
        Self { name: name.into(), flags: HashMap::new(), args: Vec::new(), callback }
    }

    pub fn arg(mut self, descriptor: ArgDescriptor) -> Self {
        self.args.push(descriptor);
        self
    }

    pub fn flag(mut self, ch: char, weight: u64) -> Self {
        self.flags.insert(ch, weight);
        self
    }

    /// Positional (non-reserved) descriptors, in declared order.
    pub fn positional_descriptors(&self) -> impl Iterator<Item = &ArgDescriptor> {
        self.args.iter().filter(|a| a.name != ARG_SCOPE && a.name != ARG_MODE)
    }

    pub fn has_mode(&self) -> bool {
        self.args.iter().any(|a| a.name == ARG_MODE)
    }
}
