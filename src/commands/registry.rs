//! Command Registry (spec.md §4.3) — compiles name → positional index.
//!
//! Shape follows the teacher's `commands/registry.rs` almost exactly
//! (a `HashMap<String, _>` with `register`/`get`/`contains`), generalized
//! from "filesystem command" to "argument-schema command" and extended with
//! the compiled name→position index the dispatcher needs.

use std::collections::HashMap;

use super::types::CommandSpec;

/// A registered command plus its compiled name→position index map, used by
/// the dispatcher to resolve `--long-option` names to a positional slot.
#[derive(Clone)]
pub struct CompiledCommand {
    pub spec: CommandSpec,
    pub index_by_name: HashMap<String, usize>,
}

impl CompiledCommand {
    fn compile(spec: CommandSpec) -> Self {
        let mut index_by_name = HashMap::new();
        for (i, a) in spec.args.iter().enumerate() {
            index_by_name.insert(a.name.clone(), i);
        }
        Self { spec, index_by_name }
    }
}

#[derive(Clone, Default)]
pub struct CommandRegistry {
    commands: HashMap<String, CompiledCommand>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: CommandSpec) {
        self.commands.insert(spec.name.clone(), CompiledCommand::compile(spec));
    }

    pub fn get(&self, name: &str) -> Option<&CompiledCommand> {
        self.commands.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.commands.keys().map(|s| s.as_str()).collect()
    }
}
