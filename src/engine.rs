//! Engine host API (spec.md §6.2) — `setConfig`/`plugin`/`parse`/
//! `parseTemplate`/`setVar`/`getVar`.
//!
//! The engine owns its Rule Registry, Command Registry and global variable
//! store as explicit fields (SPEC_FULL.md §4's redesign away from
//! process-globals), the way the teacher's `Bash` struct
//! (`src/bash.rs`) owns its filesystem and interpreter state rather than
//! reaching for a `static`.

use std::sync::Arc;

use crate::commands::{builtins, CommandRegistry, CommandSpec};
use crate::error::EngineErrorPayload;
use crate::executor::Pipeline;
use crate::mode::Mode;
use crate::normalizer;
use crate::rules::RuleRegistry;
use crate::scope::{Scope, VarStore, CONTEXT, DEFAULT_MAX_DEPTH};
use crate::template;
use crate::value::Value;

/// Recursion/fold ceilings carried by every `Scope` this engine creates
/// (SPEC_FULL.md §4 "Execution limits").
#[derive(Debug, Clone, Copy)]
pub struct EngineLimits {
    pub max_depth: u32,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self { max_depth: DEFAULT_MAX_DEPTH }
    }
}

/// A configuration callback that registers rules/commands into an
/// `EngineConfig`, installed before the caller's own `commands`/`rules`
/// (spec.md §6.2). Plugins may themselves push further plugins; `build()`
/// flattens these recursively.
pub type Plugin = Arc<dyn Fn(&mut EngineConfig) + Send + Sync>;

/// The built-in core configuration — normalizer and template rule
/// pipelines (spec.md §6.2: "`plugin()` returns the built-in core
/// configuration (operators, normalizer, converter, math)"; the
/// operator/converter/math ladders themselves are fixed algorithms, not
/// rule-driven, so this plugin's job is installing the `parse` and
/// `template` rule categories that genuinely are extensible).
pub fn plugin() -> Plugin {
    Arc::new(|config: &mut EngineConfig| {
        normalizer::install_builtin_rules(&mut config.rules);
        template::install_builtin_rules(&mut config.rules);
    })
}

/// The demo command set (SPEC_FULL.md §6) — kept separate from `plugin()`
/// so a host can build an engine with the core language but none of the
/// example commands.
pub fn builtins_plugin() -> Plugin {
    Arc::new(|config: &mut EngineConfig| {
        for spec in builtins::all() {
            config.commands.push(spec);
        }
    })
}

/// Mutable configuration accumulated before `build()` compiles it into an
/// immutable `Engine` (spec.md §6.2 `setConfig`).
#[derive(Default)]
pub struct EngineConfig {
    pub plugins: Vec<Plugin>,
    pub commands: Vec<CommandSpec>,
    pub rules: RuleRegistry,
    pub limits: EngineLimits,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plugin(mut self, p: Plugin) -> Self {
        self.plugins.push(p);
        self
    }

    pub fn command(mut self, spec: CommandSpec) -> Self {
        self.commands.push(spec);
        self
    }

    pub fn limits(mut self, limits: EngineLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Installs plugins first (recursively, in case a plugin itself queues
    /// more), then commands, then rules — per spec.md §6.2's `setConfig`
    /// ordering.
    fn install_plugins(&mut self) {
        while !self.plugins.is_empty() {
            let pending = std::mem::take(&mut self.plugins);
            for p in pending {
                p(self);
            }
        }
    }

    pub fn build(mut self) -> Engine {
        self.install_plugins();
        let mut commands = CommandRegistry::new();
        for spec in self.commands {
            commands.register(spec);
        }
        Engine {
            rules: Arc::new(self.rules),
            commands: Arc::new(commands),
            globals: VarStore::new(),
            limits: self.limits,
        }
    }
}

/// A configured, ready-to-use engine instance. Registries are immutable
/// `Arc` snapshots after `build()`; the variable store is the one
/// interior-mutable piece (SPEC_FULL.md §4).
#[derive(Clone)]
pub struct Engine {
    rules: Arc<RuleRegistry>,
    commands: Arc<CommandRegistry>,
    globals: VarStore,
    limits: EngineLimits,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        config.build()
    }

    /// Core language plus the demo command set (SPEC_FULL.md §6) — the
    /// configuration the CLI binary builds.
    pub fn with_builtins() -> Self {
        EngineConfig::new().plugin(plugin()).plugin(builtins_plugin()).build()
    }

    fn new_scope(&self) -> Scope {
        Scope::new(self.globals.clone()).with_max_depth(self.limits.max_depth)
    }

    pub fn set_var(&self, name: impl Into<String>, value: Value) {
        self.globals.set(name, value);
    }

    pub fn get_var(&self, name: &str, scope: Option<&Scope>) -> Value {
        match scope {
            Some(s) => crate::scope::get_var_simple(name, s, None),
            None => self.globals.get(name).unwrap_or(Value::Undefined),
        }
    }

    /// `parse(source, scope?, context?, async=true)`.
    pub async fn parse_async(
        &self,
        source: &str,
        scope: Option<Scope>,
        context: Option<Value>,
    ) -> Result<Value, EngineErrorPayload> {
        let mut scope = scope.unwrap_or_else(|| self.new_scope());
        if let Some(ctx) = context {
            scope.set_local(CONTEXT, ctx);
        }
        let exec = Pipeline::new(&self.rules, &self.commands);
        exec.run(source, &mut scope, Mode::Async).await
    }

    /// `parse(source, scope?, context?, async=false)` — drives the same
    /// `async fn` to completion with `block_on`; `Mode::Sync` never
    /// performs a real `.await` (only `now_or_never` polls), so this never
    /// blocks on external work (SPEC_FULL.md §5).
    pub fn parse(
        &self,
        source: &str,
        scope: Option<Scope>,
        context: Option<Value>,
    ) -> Result<Value, EngineErrorPayload> {
        let mut scope = scope.unwrap_or_else(|| self.new_scope());
        if let Some(ctx) = context {
            scope.set_local(CONTEXT, ctx);
        }
        let exec = Pipeline::new(&self.rules, &self.commands);
        futures::executor::block_on(exec.run(source, &mut scope, Mode::Sync))
    }

    pub async fn parse_template_async(
        &self,
        source: &str,
        ty: &str,
        scope: Option<Scope>,
    ) -> Result<String, EngineErrorPayload> {
        let mut scope = scope.unwrap_or_else(|| self.new_scope());
        let exec = Pipeline::new(&self.rules, &self.commands);
        template::parse_template(source, ty, &mut scope, Mode::Async, &self.rules, &exec).await
    }

    pub fn parse_template(
        &self,
        source: &str,
        ty: &str,
        scope: Option<Scope>,
    ) -> Result<String, EngineErrorPayload> {
        let mut scope = scope.unwrap_or_else(|| self.new_scope());
        let exec = Pipeline::new(&self.rules, &self.commands);
        futures::executor::block_on(template::parse_template(
            source,
            ty,
            &mut scope,
            Mode::Sync,
            &self.rules,
            &exec,
        ))
    }

    pub fn new_user_scope(&self) -> Scope {
        self.new_scope()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_parse_folds_nested_parens() {
        let engine = Engine::with_builtins();
        let v = engine.parse("((1+2)*3-4)/5", None, None).unwrap();
        assert!(matches!(v, Value::Float(f) if f == 1.0) || matches!(v, Value::Int(1)));
    }

    #[test]
    fn set_var_is_visible_to_a_later_parse() {
        let engine = Engine::with_builtins();
        engine.set_var("greeting", Value::str("hi"));
        let v = engine.parse("$greeting", None, None).unwrap();
        assert!(matches!(v, Value::Str(s) if &*s == "hi"));
    }

    #[test]
    fn builtin_concat_command_is_registered() {
        let engine = Engine::with_builtins();
        let v = engine
            .parse(r#"concat -ab -c -D --args 1 2 3 --delim "|""#, None, None)
            .unwrap();
        assert!(matches!(v, Value::Str(s) if &*s == "1|2|3"));
    }

    #[tokio::test]
    async fn async_parse_resolves_deferred_builtin() {
        let engine = Engine::with_builtins();
        let v = engine.parse_async("async (async 2)*2", None, None).await.unwrap();
        assert!(matches!(v, Value::Int(4)));
    }

    #[test]
    fn json_template_round_trips_scalar_directive() {
        let engine = Engine::with_builtins();
        let out = engine.parse_template(r#"{"test": "#xsh 2+2"}"#, "json", None).unwrap();
        assert_eq!(out, r#"{"test": 4}"#);
    }
}
