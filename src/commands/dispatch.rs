//! Command dispatch (spec.md §4.3) — the positional / variadic /
//! mode-flag / long-option argument binding protocol.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::error::EngineErrorPayload;
use crate::scope::Scope;
use crate::value::Value;

use super::registry::{CommandRegistry, CompiledCommand};
use super::types::{CommandArgs, ARG_MODE, ARG_SCOPE};

fn prop_not_found(msg: impl Into<String>) -> EngineErrorPayload {
    EngineErrorPayload::new("PropertyNotFound", msg)
}
fn prop_required(msg: impl Into<String>) -> EngineErrorPayload {
    EngineErrorPayload::new("PropertyRequired", msg)
}
fn wrong_position(msg: impl Into<String>) -> EngineErrorPayload {
    EngineErrorPayload::new(
        "WrongArgumentPosition",
        format!(
            "{}: Required argument before optional argument, or in the variadic argument",
            msg.into()
        ),
    )
}
fn args_length_invalid(msg: impl Into<String>) -> EngineErrorPayload {
    EngineErrorPayload::new("ArgumentsLengthInvalid", msg)
}

/// `--some-kebab-name` → `someKebabName`.
fn kebab_to_camel(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut upper_next = false;
    for ch in s.chars() {
        if ch == '-' {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

struct Pending {
    idx: usize,
    variadic: bool,
}

/// Look up `name` in the registry and bind `tokens` against its declared
/// argument schema, per the algorithm in spec.md §4.3.
pub fn bind_command(
    registry: &CommandRegistry,
    name: &str,
    tokens: Vec<Value>,
    scope: Scope,
) -> Result<(CompiledCommand, CommandArgs), EngineErrorPayload> {
    let compiled = registry
        .get(name)
        .ok_or_else(|| prop_not_found(format!("command not found: {}", name)))?
        .clone();

    let positional: Vec<(usize, &super::types::ArgDescriptor)> = compiled
        .spec
        .args
        .iter()
        .enumerate()
        .filter(|(_, a)| a.name != ARG_SCOPE && a.name != ARG_MODE)
        .collect();

    if positional.is_empty() && !tokens.is_empty() {
        return Err(args_length_invalid(format!(
            "command '{}' takes no arguments: length must be equal to 0",
            name
        )));
    }

    let mut collected: HashMap<usize, Vec<Value>> = HashMap::new();
    let mut singles: HashMap<usize, Value> = HashMap::new();
    let mut mode_value: u64 = 0;
    let mut seen_named = false;
    let mut positional_variadic_active = false;
    let mut pos_ptr = 0usize;
    let mut pending: Option<Pending> = None;

    fn finalize_pending(pending: &mut Option<Pending>, singles: &mut HashMap<usize, Value>) {
        if let Some(p) = pending.take() {
            if !p.variadic {
                singles.entry(p.idx).or_insert(Value::Bool(true));
            }
        }
    }

    for token in tokens {
        if let Value::Str(s) = &token {
            if s.starts_with("--") && s.len() > 2 {
                finalize_pending(&mut pending, &mut singles);
                if positional_variadic_active {
                    return Err(wrong_position(format!("'{}' after variadic argument", s)));
                }
                seen_named = true;
                let kebab = &s[2..];
                let camel = kebab_to_camel(kebab);
                let idx = *compiled
                    .index_by_name
                    .get(&camel)
                    .ok_or_else(|| prop_not_found(format!("--{}", kebab)))?;
                let descriptor = &compiled.spec.args[idx];
                pending = Some(Pending { idx, variadic: descriptor.variadic });
                continue;
            }
            if s.len() > 1 && s.starts_with('-') && !s.starts_with("--") {
                let rest = &s[1..];
                if rest.chars().all(|c| c.is_alphabetic()) {
                    finalize_pending(&mut pending, &mut singles);
                    if positional_variadic_active {
                        return Err(wrong_position(format!("'{}' after variadic argument", s)));
                    }
                    seen_named = true;
                    for ch in rest.chars() {
                        let weight = compiled
                            .spec
                            .flags
                            .get(&ch)
                            .ok_or_else(|| prop_not_found(format!("-{}", ch)))?;
                        mode_value |= weight;
                    }
                    continue;
                }
            }
        }

        // Plain token.
        if let Some(p) = pending.take() {
            if p.variadic {
                collected.entry(p.idx).or_default().push(token);
                pending = Some(p);
            } else {
                singles.insert(p.idx, token);
            }
            continue;
        }

        if seen_named {
            return Err(wrong_position("plain argument"));
        }

        if pos_ptr >= positional.len() {
            return Err(args_length_invalid(format!(
                "command '{}' received more positional arguments than declared",
                name
            )));
        }
        let (global_idx, descriptor) = positional[pos_ptr];
        if descriptor.variadic {
            collected.entry(global_idx).or_default().push(token);
            positional_variadic_active = true;
        } else {
            singles.insert(global_idx, token);
            pos_ptr += 1;
        }
    }

    finalize_pending(&mut pending, &mut singles);

    let mut values: IndexMap<String, Value> = IndexMap::new();
    for (global_idx, descriptor) in &positional {
        if descriptor.variadic {
            let items = collected.remove(global_idx).unwrap_or_default();
            if items.is_empty() {
                if descriptor.required {
                    return Err(prop_required(format!(
                        "'{}' requires at least one value",
                        descriptor.name
                    )));
                }
                let val = descriptor.default.clone().unwrap_or_else(|| Value::seq(vec![]));
                values.insert(descriptor.name.clone(), val);
            } else {
                values.insert(descriptor.name.clone(), Value::seq(items));
            }
        } else if let Some(v) = singles.remove(global_idx) {
            values.insert(descriptor.name.clone(), v);
        } else if let Some(def) = descriptor.default.clone() {
            values.insert(descriptor.name.clone(), def);
        } else if descriptor.required {
            return Err(prop_required(format!("'{}' is required", descriptor.name)));
        } else {
            values.insert(descriptor.name.clone(), Value::Undefined);
        }
    }

    if compiled.spec.has_mode() {
        // mode_value already defaults to 0; nothing further to do.
    }

    Ok((compiled, CommandArgs { values, mode: mode_value, scope }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::types::{ArgDescriptor, CommandSpec};
    use crate::scope::VarStore;
    use std::sync::Arc;

    fn noop_callback() -> crate::commands::types::CommandFn {
        Arc::new(|args: CommandArgs| Box::pin(async move { Ok(Value::Int(args.mode as i64)) }))
    }

    fn concat_spec() -> CommandSpec {
        CommandSpec::new("concat", noop_callback())
            .flag('a', 1)
            .flag('b', 2)
            .flag('c', 4)
            .flag('D', 8)
            .arg(ArgDescriptor::new("args").variadic())
            .arg(ArgDescriptor::new("delim").default_value(Value::str(",")))
    }

    #[test]
    fn concat_named_variadic_then_named_scalar() {
        let mut reg = CommandRegistry::new();
        reg.register(concat_spec());
        let tokens = vec![
            Value::str("-ab"),
            Value::str("-c"),
            Value::str("-D"),
            Value::str("--args"),
            Value::Int(1),
            Value::Int(2),
            Value::Int(3),
            Value::str("--delim"),
            Value::str("|"),
        ];
        let scope = Scope::new(VarStore::new());
        let (_cmd, args) = bind_command(&reg, "concat", tokens, scope).unwrap();
        assert_eq!(args.mode, 1 | 2 | 4 | 8);
        match args.get("args") {
            Value::Seq(v) => assert_eq!(v.len(), 3),
            _ => panic!("expected seq"),
        }
        assert!(matches!(args.get("delim"), Value::Str(s) if &*s == "|"));
    }

    #[test]
    fn concat_positional_variadic_then_flag_is_wrong_position() {
        let mut reg = CommandRegistry::new();
        reg.register(concat_spec());
        let tokens =
            vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::str("-a")];
        let scope = Scope::new(VarStore::new());
        let err = bind_command(&reg, "concat", tokens, scope).unwrap_err();
        assert_eq!(err.kind, "WrongArgumentPosition");
    }

    #[test]
    fn min_with_no_args_is_property_required() {
        let mut reg = CommandRegistry::new();
        reg.register(
            CommandSpec::new("min", noop_callback())
                .arg(ArgDescriptor::new("a").required())
                .arg(ArgDescriptor::new("b").required()),
        );
        let scope = Scope::new(VarStore::new());
        let err = bind_command(&reg, "min", vec![], scope).unwrap_err();
        assert_eq!(err.kind, "PropertyRequired");
    }

    #[test]
    fn random_with_args_is_arguments_length_invalid() {
        let mut reg = CommandRegistry::new();
        reg.register(CommandSpec::new("random", noop_callback()));
        let scope = Scope::new(VarStore::new());
        let err = bind_command(&reg, "random", vec![Value::Int(1)], scope).unwrap_err();
        assert_eq!(err.kind, "ArgumentsLengthInvalid");
    }

    #[test]
    fn unknown_long_option_is_property_not_found() {
        let mut reg = CommandRegistry::new();
        reg.register(
            CommandSpec::new("async", noop_callback())
                .arg(ArgDescriptor::new("value"))
                .arg(ArgDescriptor::new("asArray")),
        );
        let scope = Scope::new(VarStore::new());
        let err =
            bind_command(&reg, "async", vec![Value::str("--is-array")], scope).unwrap_err();
        assert_eq!(err.kind, "PropertyNotFound");
    }

    #[test]
    fn unknown_short_flag_is_property_not_found() {
        let mut reg = CommandRegistry::new();
        reg.register(
            CommandSpec::new("async", noop_callback())
                .arg(ArgDescriptor::new("value"))
                .arg(ArgDescriptor::new("asArray")),
        );
        let scope = Scope::new(VarStore::new());
        let err = bind_command(&reg, "async", vec![Value::str("-P")], scope).unwrap_err();
        assert_eq!(err.kind, "PropertyNotFound");
    }

    #[test]
    fn named_scalar_then_plain_token_is_wrong_position() {
        let mut reg = CommandRegistry::new();
        reg.register(
            CommandSpec::new("async", noop_callback())
                .arg(ArgDescriptor::new("value"))
                .arg(ArgDescriptor::new("asArray")),
        );
        let scope = Scope::new(VarStore::new());
        let tokens = vec![Value::str("--as-array"), Value::Bool(true), Value::Int(1)];
        let err = bind_command(&reg, "async", tokens, scope).unwrap_err();
        assert_eq!(err.kind, "WrongArgumentPosition");
    }
}
