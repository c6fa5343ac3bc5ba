//! Built-in demo commands (SPEC_FULL.md §6).
//!
//! A small, host-I/O-free command set used to exercise the dispatch
//! protocol end to end, and referenced by name in spec.md §8's literal
//! scenario table (`concat`, `async`, `min`, `random`). None of these are
//! special-cased by the evaluator — they are ordinary registered commands,
//! the way the teacher's `ls`/`cat`/`wc` are ordinary registered
//! `Command` impls (`src/commands/registry.rs`).

use std::sync::Arc;

use crate::error::EngineErrorPayload;
use crate::value::{Deferred, Value};

use super::types::{ArgDescriptor, CommandArgs, CommandResult, CommandSpec};

fn type_mismatch(msg: impl Into<String>) -> EngineErrorPayload {
    EngineErrorPayload::new("PropertyTypeMismatch", msg)
}

fn concat_spec() -> CommandSpec {
    CommandSpec::new(
        "concat",
        Arc::new(|args: CommandArgs| {
            Box::pin(async move {
                let delim = args.get("delim").to_display_string();
                let items = match args.get("args") {
                    Value::Seq(v) => (*v).clone(),
                    other => vec![other],
                };
                let joined = items
                    .iter()
                    .map(|v| v.to_display_string())
                    .collect::<Vec<_>>()
                    .join(&delim);
                Ok(Value::str(joined))
            })
        }),
    )
    .flag('a', 1)
    .flag('b', 2)
    .flag('c', 4)
    .flag('D', 8)
    .arg(ArgDescriptor::new("args").variadic())
    .arg(ArgDescriptor::new("delim").default_value(Value::str(",")))
}

fn async_spec() -> CommandSpec {
    CommandSpec::new(
        "async",
        Arc::new(|args: CommandArgs| {
            Box::pin(async move {
                let value = args.get("value");
                let as_array = args.get("asArray").truthy();
                let resolved = if as_array { Value::seq(vec![value]) } else { value };
                Ok(Value::Deferred(Deferred::ready(resolved)))
            })
        }),
    )
    .arg(ArgDescriptor::new("value").default_value(Value::Undefined))
    .arg(ArgDescriptor::new("asArray").default_value(Value::Bool(false)))
}

fn numeric(v: &Value, label: &str) -> Result<f64, EngineErrorPayload> {
    v.as_f64().ok_or_else(|| type_mismatch(format!("'{}' is not numeric", label)))
}

fn min_spec() -> CommandSpec {
    CommandSpec::new(
        "min",
        Arc::new(|args: CommandArgs| {
            Box::pin(async move {
                let a = numeric(&args.get("a"), "a")?;
                let b = numeric(&args.get("b"), "b")?;
                Ok(if a <= b { args.get("a") } else { args.get("b") })
            })
        }),
    )
    .arg(ArgDescriptor::new("a").required())
    .arg(ArgDescriptor::new("b").required())
}

fn max_spec() -> CommandSpec {
    CommandSpec::new(
        "max",
        Arc::new(|args: CommandArgs| {
            Box::pin(async move {
                let a = numeric(&args.get("a"), "a")?;
                let b = numeric(&args.get("b"), "b")?;
                Ok(if a >= b { args.get("a") } else { args.get("b") })
            })
        }),
    )
    .arg(ArgDescriptor::new("a").required())
    .arg(ArgDescriptor::new("b").required())
}

fn random_spec() -> CommandSpec {
    // Deterministic pseudo-random value derived from a counter stashed on
    // the scope rather than a real RNG — keeps the engine free of host
    // entropy dependencies, consistent with spec.md §1's "not a secure
    // sandbox" framing not extending to "needs true randomness".
    CommandSpec::new(
        "random",
        Arc::new(|_args: CommandArgs| {
            Box::pin(async move {
                use std::collections::hash_map::DefaultHasher;
                use std::hash::{Hash, Hasher};
                use std::time::{SystemTime, UNIX_EPOCH};
                let mut hasher = DefaultHasher::new();
                SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos().hash(&mut hasher);
                let bits = hasher.finish();
                Ok(Value::Float((bits % 1_000_000) as f64 / 1_000_000.0))
            })
        }),
    )
}

fn typeof_spec() -> CommandSpec {
    CommandSpec::new(
        "typeof",
        Arc::new(|args: CommandArgs| {
            Box::pin(async move { Ok(Value::str(args.get("value").type_tag())) })
        }),
    )
    .arg(ArgDescriptor::new("value").required())
}

fn keys_spec() -> CommandSpec {
    CommandSpec::new(
        "keys",
        Arc::new(|args: CommandArgs| {
            Box::pin(async move {
                match args.get("value") {
                    Value::Map(m) => {
                        Ok(Value::seq(m.keys().map(|k| Value::str(k.clone())).collect()))
                    }
                    Value::Seq(s) => Ok(Value::seq(
                        (0..s.len()).map(|i| Value::str(i.to_string())).collect(),
                    )),
                    _ => Err(type_mismatch("keys: expected array or object")),
                }
            })
        }),
    )
    .arg(ArgDescriptor::new("value").required())
}

fn len_spec() -> CommandSpec {
    CommandSpec::new(
        "len",
        Arc::new(|args: CommandArgs| {
            Box::pin(async move {
                match args.get("value") {
                    Value::Map(m) => Ok(Value::Int(m.len() as i64)),
                    Value::Seq(s) => Ok(Value::Int(s.len() as i64)),
                    Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                    _ => Err(type_mismatch("len: expected array, object or string")),
                }
            })
        }),
    )
    .arg(ArgDescriptor::new("value").required())
}

/// Result type alias used by the async closures above. Kept for clarity at
/// call sites that need to name it explicitly.
pub type BuiltinResult = CommandResult;

/// All built-in demo command specs, in the order they should be registered.
pub fn all() -> Vec<CommandSpec> {
    vec![
        concat_spec(),
        async_spec(),
        min_spec(),
        max_spec(),
        random_spec(),
        typeof_spec(),
        keys_spec(),
        len_spec(),
    ]
}
