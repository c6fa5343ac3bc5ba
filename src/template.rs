//! Template Engine (spec.md §4.10) — `parseTemplate`.
//!
//! Built-in directives are registered into the `template` rule category the
//! same way the normalizer installs its fixed pipeline (`normalizer.rs`):
//! each entry scans the *whole* buffer for its own syntax and rewrites every
//! occurrence, re-entering the full `;`/`|`/… pipeline through the
//! `Executor` trait to evaluate a captured command. Rules are filtered by
//! source `type` (`"js"` / `"json"`) via `RuleMeta::for_types` and applied
//! in ascending `order`, so the block directive (order ≤ −9999) always
//! consumes its span before the line directive can match inside it.

use std::sync::Arc;

use crate::converter::Executor;
use crate::error::EngineErrorPayload;
use crate::mode::Mode;
use crate::rules::{Rule, RuleMeta, RuleRegistry, TemplateCallback};
use crate::scope::{Scope, OFFSET, TEMPLATE};
use crate::value::Value;

/// Run every registered `template`-category rule for `ty`, in `order`, over
/// `source`.
pub async fn parse_template(
    source: &str,
    ty: &str,
    scope: &mut Scope,
    mode: Mode,
    registry: &RuleRegistry,
    exec: &dyn Executor,
) -> Result<String, EngineErrorPayload> {
    let mut text = source.to_string();
    for rule in registry.template.iter_for_type(ty) {
        text = (rule.callback)(&text, scope, mode, exec).await?;
    }
    Ok(text)
}

pub fn install_builtin_rules(registry: &mut RuleRegistry) {
    registry.template.register(rule(-9999, "js-block-directive", &["js"], |src, scope, mode, exec| {
        Box::pin(block_directive(src, scope, mode, exec))
    }));
    registry.template.register(rule(-9000, "js-line-directive", &["js"], |src, scope, mode, exec| {
        Box::pin(line_directive(src, scope, mode, exec))
    }));
    registry.template.register(rule(-8000, "js-inline-directive", &["js"], |src, scope, mode, exec| {
        Box::pin(inline_directive(src, scope, mode, exec))
    }));
    registry.template.register(rule(-7000, "js-constants", &["js"], |src, scope, mode, exec| {
        Box::pin(expand_constants(src, scope, mode, exec))
    }));
    registry.template.register(rule(-9999, "json-whole-directive", &["json"], |src, scope, mode, exec| {
        Box::pin(json_directive(src, scope, mode, exec))
    }));
}

fn rule(
    order: i32,
    name: &str,
    types: &[&str],
    f: impl for<'a> Fn(
            &'a str,
            &'a mut Scope,
            Mode,
            &'a dyn Executor,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<String, EngineErrorPayload>> + Send + 'a>>
        + Send
        + Sync
        + 'static,
) -> Rule<TemplateCallback> {
    Rule {
        name: Some(name.to_string()),
        key: None,
        order,
        meta: RuleMeta::for_types(types),
        callback: Arc::new(f),
    }
}

/// `number`/`string` (bigint folds into `Int` here) → literal string;
/// anything else → empty string (spec.md §4.10).
fn format_result(v: &Value) -> String {
    match v {
        Value::Int(_) | Value::Float(_) | Value::Str(_) => v.to_display_string(),
        _ => String::new(),
    }
}

/// `//#xsht <command>` … `///xsht` — the block body is stashed into
/// `scope.template`/`scope.offset` (the body's byte offset within the full
/// source) before `<command>` is evaluated; the whole span (both marker
/// lines and everything between) is replaced by the formatted result plus
/// the closing marker's line terminator, preserving line count.
async fn block_directive(
    src: &str,
    scope: &mut Scope,
    mode: Mode,
    exec: &dyn Executor,
) -> Result<String, EngineErrorPayload> {
    let lines = split_keep_terminators(src);
    let mut out = String::with_capacity(src.len());
    let mut offset = 0usize;
    let mut i = 0usize;
    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim_start_matches([' ', '\t']);
        let Some(command_part) = trimmed.strip_prefix("//#xsht ") else {
            out.push_str(line);
            offset += line.len();
            i += 1;
            continue;
        };
        let command = command_part.trim_end_matches(['\n', '\r']).to_string();
        let body_offset = offset + line.len();

        let mut body = String::new();
        let mut j = i + 1;
        let mut closed = false;
        while j < lines.len() {
            if lines[j].trim() == "///xsht" {
                closed = true;
                break;
            }
            body.push_str(lines[j]);
            j += 1;
        }
        if !closed {
            for k in i..lines.len() {
                out.push_str(lines[k]);
            }
            break;
        }

        scope.set_local(TEMPLATE, Value::str(body.clone()));
        scope.set_local(OFFSET, Value::Int(body_offset as i64));
        let result = exec.exec(command, scope, mode).await?;
        // Every consumed line contributes its own terminator (or none, for a
        // final unterminated line) to the output, so the block collapses to
        // blank lines rather than disappearing — preserving line count the
        // same way the line directive does.
        out.push_str(&format_result(&result));
        out.push_str(line_terminator(line));
        for k in (i + 1)..j {
            out.push_str(line_terminator(lines[k]));
        }
        let close_line = lines[j];
        out.push_str(line_terminator(close_line));

        offset += line.len() + body.len() + close_line.len();
        i = j + 1;
    }
    Ok(out)
}

/// Split `s` into lines, each element keeping its own trailing `\n` (the
/// final element has none if `s` doesn't end with one).
fn split_keep_terminators(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0usize;
    let bytes = s.as_bytes();
    for i in 0..bytes.len() {
        if bytes[i] == b'\n' {
            out.push(&s[start..=i]);
            start = i + 1;
        }
    }
    if start < s.len() {
        out.push(&s[start..]);
    }
    out
}

fn line_terminator(line: &str) -> &'static str {
    if line.ends_with('\n') {
        "\n"
    } else {
        ""
    }
}

/// `//#xsh <command>` — anchored to line start (optional leading
/// whitespace); the command runs to end of line. The captured line
/// terminator (`\n`, `\r\n`, or none at EOF) is preserved after the
/// formatted result so the output's line count matches the input's.
async fn line_directive(
    src: &str,
    scope: &mut Scope,
    mode: Mode,
    exec: &dyn Executor,
) -> Result<String, EngineErrorPayload> {
    let mut out = String::with_capacity(src.len());
    let mut line_start = 0usize;
    let bytes = src.as_bytes();
    let mut i = 0usize;
    while i <= src.len() {
        let at_eof = i == src.len();
        let is_newline = !at_eof && bytes[i] == b'\n';
        if at_eof || is_newline {
            let line = &src[line_start..i];
            let terminator = if is_newline { "\n" } else { "" };
            let trimmed = line.trim_start_matches([' ', '\t']);
            if let Some(command) = trimmed.strip_prefix("//#xsh ") {
                let result = exec.exec(command.trim_end_matches('\r').to_string(), scope, mode).await?;
                out.push_str(&format_result(&result));
            } else {
                out.push_str(line);
            }
            out.push_str(terminator);
            line_start = i + 1;
        }
        i += 1;
    }
    Ok(out)
}

/// `` `#xsh <command>` `` — inline, substituted in place.
async fn inline_directive(
    src: &str,
    scope: &mut Scope,
    mode: Mode,
    exec: &dyn Executor,
) -> Result<String, EngineErrorPayload> {
    let mut out = String::with_capacity(src.len());
    let mut rest = src;
    loop {
        let Some(start) = rest.find("`#xsh ") else {
            out.push_str(rest);
            break;
        };
        out.push_str(&rest[..start]);
        let after = &rest[start + "`#xsh ".len()..];
        let Some(end) = after.find('`') else {
            out.push_str(&rest[start..]);
            break;
        };
        let command = after[..end].to_string();
        let result = exec.exec(command, scope, mode).await?;
        out.push_str(&format_result(&result));
        rest = &after[end + 1..];
    }
    Ok(out)
}

/// `__XSH_VAR_<NAME>__` / `__XSH_RUN_<NAME>__` / `__XSH_SYSTEM_<NAME>__`.
/// `<NAME>` is lower-cased as-is if it started with `_`, else converted
/// snake_case → camelCase before the `getVar` lookup. `RUN_` additionally
/// re-enters the pipeline on a string result, the same force-evaluation
/// `converter.rs`'s `force_evaluate` performs for `$$name`.
async fn expand_constants(
    src: &str,
    scope: &mut Scope,
    mode: Mode,
    exec: &dyn Executor,
) -> Result<String, EngineErrorPayload> {
    let mut out = String::with_capacity(src.len());
    let mut rest = src;
    loop {
        let Some(start) = rest.find("__XSH_") else {
            out.push_str(rest);
            break;
        };
        out.push_str(&rest[..start]);
        let after = &rest[start + "__XSH_".len()..];
        let kind = ["VAR_", "RUN_", "SYSTEM_"].into_iter().find(|k| after.starts_with(k));
        let Some(kind) = kind else {
            out.push_str("__XSH_");
            rest = after;
            continue;
        };
        let after_kind = &after[kind.len()..];
        let Some(end) = after_kind.find("__") else {
            out.push_str("__XSH_");
            rest = after;
            continue;
        };
        let raw_name = &after_kind[..end];
        let name = normalize_constant_name(raw_name);
        let force = kind == "RUN_";
        let value = crate::scope::get_var_simple(&name, scope, Some(Value::Undefined));
        let resolved = if force {
            match value {
                Value::Str(s) => exec.exec(s.to_string(), scope, mode).await?,
                other => other,
            }
        } else {
            value
        };
        out.push_str(&format_result(&resolved));
        rest = &after_kind[end + 2..];
    }
    Ok(out)
}

fn normalize_constant_name(raw: &str) -> String {
    if raw.starts_with('_') {
        return raw.to_lowercase();
    }
    snake_to_camel(raw)
}

fn snake_to_camel(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut upper_next = false;
    for ch in s.chars() {
        if ch == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.extend(ch.to_lowercase());
        }
    }
    out
}

/// `"#xsh <command>"` — each occurrence of this whole-string literal
/// (anywhere in the JSON source) is replaced by its evaluated result:
/// a string result is re-escaped and re-quoted; an array/object result is
/// JSON-serialized; any other scalar is inlined as a bare literal.
async fn json_directive(
    src: &str,
    scope: &mut Scope,
    mode: Mode,
    exec: &dyn Executor,
) -> Result<String, EngineErrorPayload> {
    let mut out = String::with_capacity(src.len());
    let mut rest = src;
    loop {
        let Some(start) = rest.find("\"#xsh ") else {
            out.push_str(rest);
            break;
        };
        out.push_str(&rest[..start]);
        let after = &rest[start + "\"#xsh ".len()..];
        let Some(end) = after.find('"') else {
            out.push_str(&rest[start..]);
            break;
        };
        let command = after[..end].to_string();
        let result = exec.exec(command, scope, mode).await?;
        out.push_str(&render_json_result(&result));
        rest = &after[end + 1..];
    }
    Ok(out)
}

fn render_json_result(v: &Value) -> String {
    match v {
        Value::Str(s) => serde_json::to_string(&s.to_string()).unwrap_or_else(|_| "\"\"".to_string()),
        Value::Seq(_) | Value::Map(_) => {
            serde_json::to_string(&v.to_json()).unwrap_or_else(|_| "null".to_string())
        }
        Value::Int(_) | Value::Float(_) | Value::Bool(_) => v.to_display_string(),
        Value::Null | Value::Undefined => "null".to_string(),
        Value::Fn(_) | Value::Deferred(_) => "null".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandRegistry;
    use crate::executor::Pipeline;
    use crate::normalizer;
    use crate::scope::VarStore;

    fn registry() -> RuleRegistry {
        let mut r = RuleRegistry::new();
        normalizer::install_builtin_rules(&mut r);
        install_builtin_rules(&mut r);
        r
    }

    #[tokio::test]
    async fn line_directive_preserves_line_count() {
        let rules = registry();
        let commands = CommandRegistry::new();
        let exec = Pipeline::new(&rules, &commands);
        let mut scope = Scope::new(VarStore::new());
        let src = "a\n//#xsh 2+2\nb\n";
        let out = parse_template(src, "js", &mut scope, Mode::Sync, &rules, &exec).await.unwrap();
        assert_eq!(out.lines().count(), src.lines().count());
        assert_eq!(out, "a\n4\nb\n");
    }

    #[tokio::test]
    async fn inline_directive_substitutes_in_place() {
        let rules = registry();
        let commands = CommandRegistry::new();
        let exec = Pipeline::new(&rules, &commands);
        let mut scope = Scope::new(VarStore::new());
        let src = "test `#xsh 2*2` end";
        let out = parse_template(src, "js", &mut scope, Mode::Sync, &rules, &exec).await.unwrap();
        assert_eq!(out, "test 4 end");
    }

    #[tokio::test]
    async fn json_whole_string_directive_inlines_scalar() {
        let rules = registry();
        let commands = CommandRegistry::new();
        let exec = Pipeline::new(&rules, &commands);
        let mut scope = Scope::new(VarStore::new());
        let src = r#"{"test": "#xsh 2+2"}"#;
        let out = parse_template(src, "json", &mut scope, Mode::Sync, &rules, &exec).await.unwrap();
        assert_eq!(out, r#"{"test": 4}"#);
    }

    #[tokio::test]
    async fn constants_expand_snake_to_camel_lookup() {
        let rules = registry();
        let commands = CommandRegistry::new();
        let exec = Pipeline::new(&rules, &commands);
        let mut scope = Scope::new(VarStore::new());
        scope.set_local("fooBar", Value::Int(7));
        let out =
            parse_template("x = __XSH_VAR_foo_bar__;", "js", &mut scope, Mode::Sync, &rules, &exec).await.unwrap();
        assert_eq!(out, "x = 7;");
    }

    #[tokio::test]
    async fn block_directive_stashes_body_and_preserves_line_count() {
        let rules = registry();
        let commands = CommandRegistry::new();
        let exec = Pipeline::new(&rules, &commands);
        let mut scope = Scope::new(VarStore::new());
        let src = "a\n//#xsht len $template\nignored body text\n///xsht\nb\n";
        let out = parse_template(src, "js", &mut scope, Mode::Sync, &rules, &exec).await.unwrap();
        assert_eq!(out, "a\n18\n\n\nb\n");
        assert_eq!(out.lines().count(), src.lines().count());
    }
}
