//! Converter (spec.md §4.6) — classifies and evaluates a scalar leaf token.
//!
//! Modeled as an explicit ordered ladder (spec.md §9: "model the
//! converter/math ladders as an explicit ordered iteration that yields
//! `Tried(v) | Skipped`"), using the private `Continue<T>` signal rather
//! than the real error channel. Re-entry into the full `;`/`|`/… pipeline
//! (for `(...)` groups and bare command expressions) goes through the
//! `Executor` trait rather than a direct call into `executor.rs`, breaking
//! what would otherwise be a module cycle.

use async_trait::async_trait;

use crate::error::{Continue, EngineErrorPayload};
use crate::math::{self, first_operator_in, split_first_tier};
use crate::mode::Mode;
use crate::scope::{self, Scope};
use crate::value::Value;

/// Re-entry point into the full parse pipeline, implemented by
/// `executor::Pipeline` and by test doubles. `input` is an owned string so
/// the converter never needs to borrow back into a caller's buffer across
/// an `.await`.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn exec(&self, input: String, scope: &mut Scope, mode: Mode) -> Result<Value, EngineErrorPayload>;

    /// Whether `name` is registered as a command — used by the converter's
    /// final ladder step (spec.md §4.6 step 11: "if the value is registered
    /// as a command name, invoke it with no arguments") to decide between a
    /// zero-arg command invocation and a plain string literal, without
    /// re-entering the splitter on text that cannot split any further.
    fn is_command(&self, name: &str) -> bool;

    async fn invoke_zero_arg(&self, name: &str, scope: &mut Scope, mode: Mode)
        -> Result<Value, EngineErrorPayload>;
}

/// Convert one scalar token to a `Value`, per the ladder in spec.md §4.6.
/// Guards the ladder's recursive steps (math operands, `(...)` groups) with
/// `scope`'s recursion counter (SPEC_FULL.md §4) so malformed input fails
/// with `RecursionLimit` rather than overflowing the stack.
pub async fn convert(
    token: &str,
    scope: &mut Scope,
    mode: Mode,
    exec: &dyn Executor,
) -> Result<Value, EngineErrorPayload> {
    scope.enter_recursion()?;
    let result = convert_inner(token, scope, mode, exec).await;
    scope.exit_recursion();
    result
}

async fn convert_inner(
    token: &str,
    scope: &mut Scope,
    mode: Mode,
    exec: &dyn Executor,
) -> Result<Value, EngineErrorPayload> {
    if let Continue::Done(v) = step_literal(token) {
        return Ok(v);
    }

    if token.starts_with('-') && token.len() > 1 && !token.chars().nth(1).unwrap().is_ascii_digit() {
        return Ok(Value::str(token));
    }

    // Bracket groups are checked before math-operator detection: a token
    // that is *entirely* one `(...)`/`[...]`/`{...}` group (the only shape
    // that reaches the converter still carrying literal brackets — the
    // normalizer has already hidden every other bracket group behind a
    // `$$` placeholder) must not have its insides mistaken for math split
    // points (e.g. the `+` inside `(1+2)`).
    if token.starts_with('(') && token.ends_with(')') && token.len() >= 2 {
        return exec.exec(token[1..token.len() - 1].to_string(), scope, mode).await;
    }

    if token.starts_with('[') && token.ends_with(']') && token.len() >= 2 {
        return convert_array(&token[1..token.len() - 1], scope, mode, exec).await;
    }

    if token.starts_with('{') && token.ends_with('}') && token.len() >= 2 {
        return convert_object(&token[1..token.len() - 1], scope, mode, exec).await;
    }

    // spec.md §4.6 step 5: choose the lowest-precedence operator tier
    // present, split on every occurrence within that tier, recursively
    // convert each operand, then left-fold (spec.md §4.7). Tiers are
    // checked lowest-precedence-first so e.g. `3*3-4` splits on `-`
    // (yielding `(3*3)-4`), not on the `*` that happens to appear earlier
    // in the string. This must run before the `$`-prefix check below: a
    // token like `$$p1/5` (a force-eval placeholder immediately followed by
    // a trailing operator) needs to split on `/` first, or the whole thing
    // gets swallowed as one variable path.
    if let Some((operand_texts, ops)) = split_first_tier(token) {
        let mut values = Vec::with_capacity(operand_texts.len());
        for text in &operand_texts {
            values.push(Box::pin(convert(text, scope, mode, exec)).await?);
        }
        return math::fold_with_ops(&ops, values);
    }

    if let Some(stripped) = token.strip_prefix('$') {
        return convert_variable(stripped, scope, mode, exec).await;
    }

    // Anything else reaching this point is an atomic bareword (the splitter
    // has already broken apart any `name arg arg` shape before a leaf
    // reaches the converter). Per spec.md §4.6 steps 10–11: if it names a
    // registered command, invoke it with no arguments; otherwise it is a
    // plain string literal.
    if exec.is_command(token) {
        return exec.invoke_zero_arg(token, scope, mode).await;
    }
    Ok(Value::str(token))
}

/// True when `token` would fall all the way through the ladder to the
/// bareword/command-name step (i.e. it is not a literal, number, dash-flag,
/// math expression, variable, or bracketed group). Used by the executor's
/// param fold to recognize a command-application head (`name arg arg`)
/// *before* converting it — converting it first would trigger this same
/// token's own zero-arg auto-invocation (step 11) and the head would never
/// see its arguments.
pub fn is_bare_identifier(token: &str) -> bool {
    if matches!(step_literal(token), Continue::Done(_)) {
        return false;
    }
    if token.starts_with('-') && token.len() > 1 && !token.chars().nth(1).unwrap().is_ascii_digit() {
        return false;
    }
    if first_operator_in(token).is_some() {
        return false;
    }
    if token.starts_with('$') {
        return false;
    }
    let wrapped = |open: char, close: char| token.starts_with(open) && token.ends_with(close) && token.len() >= 2;
    !(wrapped('(', ')') || wrapped('[', ']') || wrapped('{', '}'))
}

fn step_literal(token: &str) -> Continue<Value> {
    match token {
        "null" => Continue::Done(Value::Null),
        "undefined" => Continue::Done(Value::Undefined),
        "" => Continue::Done(Value::str("")),
        "true" => Continue::Done(Value::Bool(true)),
        "false" => Continue::Done(Value::Bool(false)),
        _ => {
            if let Ok(i) = token.parse::<i64>() {
                return Continue::Done(Value::Int(i));
            }
            if token.contains('.') {
                if let Ok(f) = token.parse::<f64>() {
                    return Continue::Done(Value::Float(f));
                }
            }
            Continue::Skip
        }
    }
}

/// `$name`, dotted `$a.b.c`, computed segments `$a.(expr)`, and `$$name`
/// force-evaluation (spec.md §4.6 step 6, §4.8).
async fn convert_variable(
    rest: &str,
    scope: &mut Scope,
    mode: Mode,
    exec: &dyn Executor,
) -> Result<Value, EngineErrorPayload> {
    let (force, path_text) = if let Some(p) = rest.strip_prefix('$') { (true, p) } else { (false, rest) };

    let mut segments = Vec::new();
    for raw_segment in path_text.split('.') {
        if raw_segment.is_empty() {
            continue;
        }
        let converted = if raw_segment.starts_with('(') && raw_segment.ends_with(')') {
            exec.exec(raw_segment[1..raw_segment.len() - 1].to_string(), scope, mode).await?
        } else {
            Value::str(raw_segment)
        };
        segments.push(converted.to_display_string());
    }

    let resolved = scope::get_var_path(&segments, scope, Some(Value::Undefined), mode).await?;

    if force {
        force_evaluate(resolved, scope, mode, exec).await
    } else {
        Ok(resolved)
    }
}

/// `$$` force-evaluation (spec.md §4.8): string → sub-parse; callable →
/// invoke with no (or the bound receiver's) arguments; deferred → await,
/// then re-apply; otherwise unchanged.
fn force_evaluate<'a>(
    value: Value,
    scope: &'a mut Scope,
    mode: Mode,
    exec: &'a dyn Executor,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, EngineErrorPayload>> + Send + 'a>> {
    Box::pin(async move {
        match value {
            // Mirror the converter's own bracket check (lines 74-84 above):
            // a stored string that is a whole-span `(...)`/`[...]`/`{...}`
            // group must have its delimiters stripped here too, or the
            // splitter's blind space-split (`split_on_space`) tears a
            // multi-token group like `(async 2)` into malformed leaves
            // before the converter ever gets a chance to recognize it as
            // one atomic group.
            Value::Str(s) => {
                let text = s.as_ref();
                if text.starts_with('(') && text.ends_with(')') && text.len() >= 2 {
                    exec.exec(text[1..text.len() - 1].to_string(), scope, mode).await
                } else if text.starts_with('[') && text.ends_with(']') && text.len() >= 2 {
                    convert_array(&text[1..text.len() - 1], scope, mode, exec).await
                } else if text.starts_with('{') && text.ends_with('}') && text.len() >= 2 {
                    convert_object(&text[1..text.len() - 1], scope, mode, exec).await
                } else {
                    exec.exec(text.to_string(), scope, mode).await
                }
            }
            Value::Fn(f) => {
                let args = match &f.receiver {
                    Some(r) => vec![(**r).clone()],
                    None => vec![],
                };
                (f.call)(args).await
            }
            Value::Deferred(d) => {
                let resolved = match mode {
                    Mode::Async => d.resolve().await?,
                    Mode::Sync => match d.now_or_never() {
                        Some(r) => r?,
                        None => return Ok(Value::Deferred(d)),
                    },
                };
                force_evaluate(resolved, scope, mode, exec).await
            }
            other => Ok(other),
        }
    })
}

async fn convert_array(
    inner: &str,
    scope: &mut Scope,
    mode: Mode,
    exec: &dyn Executor,
) -> Result<Value, EngineErrorPayload> {
    if inner.trim().is_empty() {
        return Ok(Value::seq(vec![]));
    }
    let mut items = Vec::new();
    for part in split_top_level(inner, ',') {
        items.push(exec.exec(part, scope, mode).await?);
    }
    Ok(Value::seq(items))
}

async fn convert_object(
    inner: &str,
    scope: &mut Scope,
    mode: Mode,
    exec: &dyn Executor,
) -> Result<Value, EngineErrorPayload> {
    let mut map = indexmap::IndexMap::new();
    if inner.trim().is_empty() {
        return Ok(Value::map(map));
    }
    let mut next_index = 0i64;
    for part in split_top_level(inner, ',') {
        let kv = split_top_level(&part, ':');
        if kv.len() >= 2 {
            let key_val = exec.exec(kv[0].clone(), scope, mode).await?;
            let value_val = exec.exec(kv[1..].join(":"), scope, mode).await?;
            map.insert(key_val.to_display_string(), value_val);
        } else {
            let value_val = exec.exec(part, scope, mode).await?;
            map.insert(next_index.to_string(), value_val);
            next_index += 1;
        }
    }
    Ok(Value::map(map))
}

/// Split on `sep` — since the normalizer has already hidden every nested
/// bracket behind a `$$` placeholder, a plain split suffices.
fn split_top_level(s: &str, sep: char) -> Vec<String> {
    s.split(sep).map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::VarStore;

    /// A minimal test double: re-enters `convert` directly rather than the
    /// real normalizer/splitter pipeline, which is enough to exercise every
    /// converter ladder step against inputs with no top-level operators.
    struct EchoExecutor;

    #[async_trait]
    impl Executor for EchoExecutor {
        async fn exec(&self, input: String, scope: &mut Scope, mode: Mode) -> Result<Value, EngineErrorPayload> {
            Box::pin(convert(&input, scope, mode, self)).await
        }

        fn is_command(&self, _name: &str) -> bool {
            false
        }

        async fn invoke_zero_arg(
            &self,
            _name: &str,
            _scope: &mut Scope,
            _mode: Mode,
        ) -> Result<Value, EngineErrorPayload> {
            Ok(Value::Undefined)
        }
    }

    #[tokio::test]
    async fn integer_literal() {
        let mut scope = Scope::new(VarStore::new());
        let v = convert("42", &mut scope, Mode::Sync, &EchoExecutor).await.unwrap();
        assert!(matches!(v, Value::Int(42)));
    }

    #[tokio::test]
    async fn null_and_undefined_literals() {
        let mut scope = Scope::new(VarStore::new());
        assert!(matches!(convert("null", &mut scope, Mode::Sync, &EchoExecutor).await.unwrap(), Value::Null));
        assert!(matches!(
            convert("undefined", &mut scope, Mode::Sync, &EchoExecutor).await.unwrap(),
            Value::Undefined
        ));
    }

    #[tokio::test]
    async fn dash_flag_token_passes_through() {
        let mut scope = Scope::new(VarStore::new());
        let v = convert("-abc", &mut scope, Mode::Sync, &EchoExecutor).await.unwrap();
        assert!(matches!(v, Value::Str(s) if &*s == "-abc"));
    }

    #[tokio::test]
    async fn math_expression_folds() {
        let mut scope = Scope::new(VarStore::new());
        let v = convert("1+2", &mut scope, Mode::Sync, &EchoExecutor).await.unwrap();
        assert!(matches!(v, Value::Int(3)));
    }

    #[tokio::test]
    async fn math_chain_respects_precedence_over_string_position() {
        let mut scope = Scope::new(VarStore::new());
        // '*' appears before '-' in the string, but '+'/'-' is the
        // lower-precedence tier, so this must fold as (3*3)-4, not 3*(3-4).
        let v = convert("3*3-4", &mut scope, Mode::Sync, &EchoExecutor).await.unwrap();
        assert!(matches!(v, Value::Int(5)));
    }

    #[tokio::test]
    async fn whole_string_paren_group_unwraps_without_looping() {
        let mut scope = Scope::new(VarStore::new());
        let v = convert("(1+2)", &mut scope, Mode::Sync, &EchoExecutor).await.unwrap();
        assert!(matches!(v, Value::Int(3)));
    }

    #[tokio::test]
    async fn array_literal_with_keyless_items() {
        let mut scope = Scope::new(VarStore::new());
        let v = convert("[1,2,3]", &mut scope, Mode::Sync, &EchoExecutor).await.unwrap();
        match v {
            Value::Seq(items) => assert_eq!(items.len(), 3),
            other => panic!("expected seq, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn object_literal_keyless_gets_integer_index() {
        let mut scope = Scope::new(VarStore::new());
        let v = convert("{a:1,2}", &mut scope, Mode::Sync, &EchoExecutor).await.unwrap();
        match v {
            Value::Map(m) => {
                assert!(matches!(m.get("a"), Some(Value::Int(1))));
                assert!(matches!(m.get("0"), Some(Value::Int(2))));
            }
            other => panic!("expected map, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn variable_lookup_reads_local_scope() {
        let mut scope = Scope::new(VarStore::new());
        scope.set_local("foo", Value::Int(9));
        let v = convert("$foo", &mut scope, Mode::Sync, &EchoExecutor).await.unwrap();
        assert!(matches!(v, Value::Int(9)));
    }

    #[tokio::test]
    async fn dollar_dollar_force_evaluates_string_via_executor() {
        let mut scope = Scope::new(VarStore::new());
        scope.set_local("cmd", Value::str("1+1"));
        let v = convert("$$cmd", &mut scope, Mode::Sync, &EchoExecutor).await.unwrap();
        assert!(matches!(v, Value::Int(2)));
    }
}
