//! Scope & Variable Store (spec.md §4.2).
//!
//! Two-tier lookup: a local `Scope` overlaying a process-wide `VarStore`.
//! Per SPEC_FULL.md §4, the store is owned by the `Engine` instance rather
//! than a `static`/`lazy_static` global — the teacher's `Bash` struct
//! (`src/bash.rs`) owns its `InterpreterState` the same way.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::EngineErrorPayload;
use crate::mode::Mode;
use crate::value::Value;

/// Default ceiling for the converter/executor recursion counters carried on
/// `Scope` (SPEC_FULL.md §4 "Execution limits" — mirrors the teacher's
/// `ExecutionLimits` recursion-depth guard, `src/interpreter/types.rs`).
pub const DEFAULT_MAX_DEPTH: u32 = 256;

/// Reserved scope keys (spec.md §3).
pub const CONTEXT: &str = "context";
pub const TEMPLATE: &str = "template";
pub const OFFSET: &str = "offset";
pub const TEMPLATE_OFFSET: &str = "templateOffset";
pub const GLOBAL: &str = "global";

/// Process-wide (engine-wide) variable store. Lives for the lifetime of the
/// `Engine`; mutated by `>>` and by placeholder creation during
/// normalization. Single-threaded evaluation means a `Mutex` here is never
/// contended — it exists so `Engine` can be `Clone`/`Arc`-shared by a host
/// without unsafe aliasing, not for real concurrency.
#[derive(Clone, Default)]
pub struct VarStore {
    inner: Arc<Mutex<HashMap<String, Value>>>,
}

impl VarStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.inner.lock().unwrap().get(name).cloned()
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.inner.lock().unwrap().insert(name.into(), value);
    }
}

/// A single evaluation's local scope, overlaying the engine's `VarStore`.
/// A fresh `Scope` is created per top-level `parse` call (or supplied by the
/// caller), mutated during evaluation, and discarded on return.
#[derive(Clone)]
pub struct Scope {
    pub locals: HashMap<String, Value>,
    pub globals: VarStore,
    /// Read-only bridge to host-supplied ambient names (`$global.Math`, …).
    pub global_bridge: Arc<HashMap<String, Value>>,
    /// Monotonic counter backing normalizer placeholder names (spec.md §4.4).
    pub placeholder_counter: u64,
    /// Current converter/executor recursion depth and its ceiling
    /// (SPEC_FULL.md §4 "Execution limits"). Incremented on entry to
    /// `converter::convert` and `executor::Pipeline::eval_tree`, decremented
    /// on return, so adversarial or malformed input fails with
    /// `EngineError::RecursionLimit` instead of overflowing the stack.
    pub depth: u32,
    pub max_depth: u32,
}

impl Scope {
    pub fn new(globals: VarStore) -> Self {
        Self {
            locals: HashMap::new(),
            globals,
            global_bridge: Arc::new(HashMap::new()),
            placeholder_counter: 0,
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_bridge(globals: VarStore, bridge: HashMap<String, Value>) -> Self {
        Self {
            locals: HashMap::new(),
            globals,
            global_bridge: Arc::new(bridge),
            placeholder_counter: 0,
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Enter one level of converter/executor recursion. Returns
    /// `RecursionLimit` without mutating `depth` further if the ceiling is
    /// already exceeded; callers must pair a successful call with
    /// `exit_recursion` once the recursive work returns (including on the
    /// error path, so the counter never leaks across sibling branches).
    pub fn enter_recursion(&mut self) -> Result<(), EngineErrorPayload> {
        if self.depth >= self.max_depth {
            return Err(EngineErrorPayload::new(
                "RecursionLimit",
                format!("exceeded max recursion depth of {}", self.max_depth),
            ));
        }
        self.depth += 1;
        Ok(())
    }

    pub fn exit_recursion(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Mint a fresh `__`-prefixed placeholder name and bind `value` to it
    /// locally. Placeholder names use a reserved `_` second character so
    /// they never collide with a user-chosen `$name` (spec.md §3 invariant).
    pub fn new_placeholder(&mut self, value: Value) -> String {
        let name = format!("__p{}", self.placeholder_counter);
        self.placeholder_counter += 1;
        self.locals.insert(name.clone(), value);
        name
    }

    pub fn set_local(&mut self, name: impl Into<String>, value: Value) {
        self.locals.insert(name.into(), value);
    }

    pub fn get_local(&self, name: &str) -> Option<&Value> {
        self.locals.get(name)
    }
}

/// A variable path is either a single name or a sequence of keys
/// (`$a.b.c` → `["a", "b", "c"]`).
pub type Path = Vec<String>;

/// `$name` — a variable reference.
pub fn is_variable(s: &str) -> bool {
    s.starts_with('$')
}

/// `$$name` — forces execution of callables/inline commands at the slot.
pub fn is_runnable_variable(s: &str) -> bool {
    s.starts_with("$$")
}

/// `getVar(name, scope, default?)` for a simple name: `scope[name] ??
/// globalVars[name] ?? default`.
pub fn get_var_simple(name: &str, scope: &Scope, default: Option<Value>) -> Value {
    if name == GLOBAL {
        return Value::map(
            scope
                .global_bridge
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );
    }
    if let Some(v) = scope.get_local(name) {
        return v.clone();
    }
    if let Some(v) = scope.globals.get(name) {
        return v;
    }
    default.unwrap_or(Value::Undefined)
}

/// `getVar(path, scope, default?)` for a dotted path (spec.md §4.2).
///
/// Resolves the head, then for each subsequent key: if the current value is
/// null-ish, returns `default`; if it is a `Deferred`, the continuation
/// defers per `mode`; if the resolved property is a callable bound to the
/// parent object, returns a `Func` with `receiver` set to that parent.
pub async fn get_var_path(
    path: &[String],
    scope: &Scope,
    default: Option<Value>,
    mode: Mode,
) -> Result<Value, EngineErrorPayload> {
    if path.is_empty() {
        return Ok(default.unwrap_or(Value::Undefined));
    }
    let mut current = get_var_simple(&path[0], scope, None);
    for key in &path[1..] {
        current = step_into(current, key, &default, mode).await?;
    }
    Ok(current)
}

fn step_into<'a>(
    current: Value,
    key: &'a str,
    default: &'a Option<Value>,
    mode: Mode,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, EngineErrorPayload>> + Send + 'a>>
{
    Box::pin(async move {
        match current {
            Value::Null | Value::Undefined => Ok(default.clone().unwrap_or(Value::Undefined)),
            Value::Deferred(d) => {
                let resolved = match mode {
                    Mode::Async => d.resolve().await?,
                    Mode::Sync => match d.now_or_never() {
                        Some(r) => r?,
                        None => return Ok(Value::Deferred(d)),
                    },
                };
                step_into(resolved, key, default, mode).await
            }
            Value::Map(map) => match map.get(key) {
                Some(v) => Ok(bind_receiver(v.clone(), Value::Map(map.clone()))),
                None => Ok(default.clone().unwrap_or(Value::Undefined)),
            },
            Value::Seq(items) => {
                if let Ok(idx) = key.parse::<usize>() {
                    match items.get(idx) {
                        Some(v) => Ok(v.clone()),
                        None => Ok(default.clone().unwrap_or(Value::Undefined)),
                    }
                } else {
                    Ok(default.clone().unwrap_or(Value::Undefined))
                }
            }
            _ => Ok(default.clone().unwrap_or(Value::Undefined)),
        }
    })
}

/// If `value` is a function, bind it to `receiver` so the dispatcher can
/// later invoke it with that receiver — spec.md §9 "this-binding dotted-path
/// lookup".
fn bind_receiver(value: Value, receiver: Value) -> Value {
    match value {
        Value::Fn(mut f) => {
            f.receiver = Some(Box::new(receiver));
            Value::Fn(f)
        }
        other => other,
    }
}

/// `setVar(path, value)` — traverses all but the last segment, failing if
/// any intermediate is a `Deferred` value (hard error for writes, per
/// spec.md §4.2), and assigns at the last segment. Missing intermediates
/// are created as `Value::Map` entries (resolves spec.md §9's Open
/// Question; see SPEC_FULL.md §5).
pub fn set_var(path: &[String], value: Value, scope: &mut Scope) -> Result<(), EngineErrorPayload> {
    if path.is_empty() {
        return Ok(());
    }
    if path.len() == 1 {
        assign_simple(&path[0], value, scope);
        return Ok(());
    }

    let head = path[0].clone();
    let mut root = scope
        .get_local(&head)
        .cloned()
        .or_else(|| scope.globals.get(&head))
        .unwrap_or(Value::Undefined);

    if root.is_nullish() {
        root = Value::map(indexmap::IndexMap::new());
    }

    set_path_in(&mut root, &path[1..], value)?;
    assign_simple(&head, root, scope);
    Ok(())
}

fn set_path_in(target: &mut Value, rest: &[String], value: Value) -> Result<(), EngineErrorPayload> {
    if rest.is_empty() {
        *target = value;
        return Ok(());
    }
    if let Value::Deferred(_) = target {
        return Err(EngineErrorPayload::new(
            "PropertyTypeMismatch",
            "cannot assign through a deferred intermediate value",
        ));
    }
    if !matches!(target, Value::Map(_)) {
        *target = Value::map(indexmap::IndexMap::new());
    }
    if let Value::Map(map) = target {
        let mut owned = (**map).clone();
        let mut child = owned.get(&rest[0]).cloned().unwrap_or(Value::Undefined);
        if child.is_nullish() && rest.len() > 1 {
            child = Value::map(indexmap::IndexMap::new());
        }
        set_path_in(&mut child, &rest[1..], value)?;
        owned.insert(rest[0].clone(), child);
        *map = Arc::new(owned);
    }
    Ok(())
}

/// Per spec.md:56's scope lifecycle invariant, `>>`/`setVar` mutates only
/// the calling scope, discarded when that `parse` call returns — it never
/// promotes a name into the engine-wide `VarStore`. That store is written
/// only through the host-level `Engine::set_var` API (spec.md §6.2).
fn assign_simple(name: &str, value: Value, scope: &mut Scope) {
    scope.locals.insert(name.to_string(), value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_lookup_prefers_local_over_global() {
        let globals = VarStore::new();
        globals.set("x", Value::Int(1));
        let mut scope = Scope::new(globals);
        scope.set_local("x", Value::Int(2));
        assert!(matches!(get_var_simple("x", &scope, None), Value::Int(2)));
    }

    #[tokio::test]
    async fn dotted_path_short_circuits_on_null() {
        let scope = Scope::new(VarStore::new());
        let mut scope = scope;
        scope.set_local("a", Value::Null);
        let path = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let v = get_var_path(&path, &scope, Some(Value::Int(9)), Mode::Sync)
            .await
            .unwrap();
        assert!(matches!(v, Value::Int(9)));
    }

    #[test]
    fn recursion_guard_trips_past_max_depth() {
        let mut scope = Scope::new(VarStore::new()).with_max_depth(2);
        scope.enter_recursion().unwrap();
        scope.enter_recursion().unwrap();
        let err = scope.enter_recursion().unwrap_err();
        assert_eq!(err.kind, "RecursionLimit");
        scope.exit_recursion();
        scope.exit_recursion();
        assert_eq!(scope.depth, 0);
    }

    #[test]
    fn set_var_creates_missing_intermediate_maps() {
        let mut scope = Scope::new(VarStore::new());
        let path = vec!["foo".to_string(), "bar".to_string(), "baz".to_string()];
        set_var(&path, Value::Int(5), &mut scope).unwrap();
        let root = scope.get_local("foo").cloned().unwrap();
        if let Value::Map(m) = root {
            if let Some(Value::Map(bar)) = m.get("bar") {
                assert!(matches!(bar.get("baz"), Some(Value::Int(5))));
            } else {
                panic!("bar not a map");
            }
        } else {
            panic!("foo not a map");
        }
    }
}
