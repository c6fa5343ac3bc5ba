//! Normalizer (spec.md §4.4) — the textual pre-pass.
//!
//! A fixed pipeline of six rewrite steps, each registered into the `parse`
//! rule category at the `order` spec.md's table prescribes, so a host
//! plugin can still splice additional parse rules in between (spec.md §9:
//! "the normalizer is a fixed pipeline, not user-extensible in the core,
//! but the rule-registry mechanism should still allow plugins to inject
//! new entries").

use std::sync::Arc;

use regex_lite::Regex;

use crate::rules::{ParseCallback, Rule, RuleMeta, RuleRegistry};
use crate::scope::Scope;
use crate::value::Value;

/// Run every registered `parse`-category rule, in `order`, over `input`.
pub fn normalize(input: &str, scope: &mut Scope, registry: &RuleRegistry) -> String {
    let mut text = input.to_string();
    for rule in registry.parse.iter() {
        text = (rule.callback)(&text, scope);
    }
    text
}

pub fn install_builtin_rules(registry: &mut RuleRegistry) {
    registry.parse.register(rule(-1000, "brackets", extract_quoted_literals));
    registry.parse.register(rule(-900, "trim-borders", |s, _| s.trim().to_string()));
    registry.parse.register(rule(-800, "collapse-spaces", collapse_spaces));
    registry.parse.register(rule(-700, "trim-math", trim_math_operators));
    registry.parse.register(rule(-600, "trim-braces", trim_brace_whitespace));
    registry.parse.register(rule(-500, "signed-numbers", extract_signed_numbers));
    registry.parse.register(rule(-400, "brace-groups", extract_brace_groups));
}

fn rule(order: i32, name: &str, f: impl Fn(&str, &mut Scope) -> String + Send + Sync + 'static) -> Rule<ParseCallback> {
    Rule { name: Some(name.to_string()), key: None, order, meta: RuleMeta::default(), callback: Arc::new(f) }
}

/// Order -1000: extract `"…"`, `'…'`, `` `…` `` literals (respecting `\`
/// escapes) into scope placeholders.
fn extract_quoted_literals(input: &str, scope: &mut Scope) -> String {
    let mut out = String::with_capacity(input.len());
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '"' || c == '\'' || c == '`' {
            let quote = c;
            let mut body = String::new();
            let mut j = i + 1;
            let mut closed = false;
            while j < chars.len() {
                if chars[j] == '\\' && j + 1 < chars.len() {
                    body.push(chars[j + 1]);
                    j += 2;
                    continue;
                }
                if chars[j] == quote {
                    closed = true;
                    j += 1;
                    break;
                }
                body.push(chars[j]);
                j += 1;
            }
            if closed {
                let placeholder = scope.new_placeholder(Value::str(body));
                out.push('$');
                out.push_str(&placeholder);
                i = j;
                continue;
            }
        }
        out.push(c);
        i += 1;
    }
    out
}

fn collapse_spaces(input: &str, _scope: &mut Scope) -> String {
    let re = Regex::new(r"\s+").unwrap();
    re.replace_all(input, " ").to_string()
}

/// Order -700: remove whitespace around math/comparison operators. Longer
/// operators are listed before their single-character prefixes so the
/// (leftmost-first) alternation never matches a truncated operator.
const MATH_OPERATORS: &[&str] =
    &["===", "!==", "==", "!=", ">=", "<=", "&&", "||", "??", ",", ":", ">", "<", "+", "*", "/", "|", "%"];

fn trim_math_operators(input: &str, _scope: &mut Scope) -> String {
    let escaped: Vec<String> = MATH_OPERATORS.iter().map(|op| regex_lite::escape(op)).collect();
    let pattern = format!(r"\s*({})\s*", escaped.join("|"));
    let re = Regex::new(&pattern).unwrap();
    re.replace_all(input, "$1").to_string()
}

fn trim_brace_whitespace(input: &str, _scope: &mut Scope) -> String {
    let open_re = Regex::new(r"([\[({])\s+").unwrap();
    let step1 = open_re.replace_all(input, "$1").to_string();
    let close_re = Regex::new(r"\s+([\])}])").unwrap();
    close_re.replace_all(&step1, "$1").to_string()
}

/// Boundary characters after which a `-` immediately followed by a digit is
/// a sign rather than a binary-minus operator. See SPEC_FULL.md §4 and
/// spec.md §9's Open Question on this rule.
fn is_sign_boundary(c: char) -> bool {
    matches!(
        c,
        '(' | '[' | '{' | ',' | ':' | ';' | '|' | '&' | '?' | '=' | '!' | '<' | '>' | '+' | '*' | '/' | '%' | ' '
    )
}

/// Order -500: fold `-123` / `-12.5` tokens in sign position into scope
/// placeholders holding the parsed negative number.
fn extract_signed_numbers(input: &str, scope: &mut Scope) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '-' && (i == 0 || is_sign_boundary(chars[i - 1])) {
            let mut j = i + 1;
            let start_digits = j;
            while j < chars.len() && chars[j].is_ascii_digit() {
                j += 1;
            }
            if j > start_digits {
                let mut is_float = false;
                if j < chars.len() && chars[j] == '.' && j + 1 < chars.len() && chars[j + 1].is_ascii_digit() {
                    is_float = true;
                    j += 1;
                    while j < chars.len() && chars[j].is_ascii_digit() {
                        j += 1;
                    }
                }
                let literal: String = chars[i..j].iter().collect();
                let value = if is_float {
                    Value::Float(literal.parse::<f64>().unwrap_or(0.0))
                } else {
                    Value::Int(literal.parse::<i64>().unwrap_or(0))
                };
                let placeholder = scope.new_placeholder(value);
                out.push('$');
                out.push_str(&placeholder);
                i = j;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// Order -400: repeatedly replace the innermost `(...)`/`[...]`/`{...}`
/// group with a `$$hash` placeholder holding the full original substring
/// (including its delimiters), until the only group left spans the entire
/// text. That last group is left as literal `(...)` text rather than
/// wrapped in a further placeholder: the converter's bracket-check step
/// unwraps a whole-string group directly, and re-exec'ing a force-evaluated
/// (`$$`) placeholder whose stored text is exactly such a group would
/// otherwise re-enter this function and re-wrap the identical text forever.
fn extract_brace_groups(input: &str, scope: &mut Scope) -> String {
    let mut text = input.to_string();
    loop {
        let Some((start, end)) = find_innermost_group(&text) else { break };
        if start == 0 && end + 1 == text.len() {
            break;
        }
        let group: String = text[start..=end].to_string();
        let placeholder = scope.new_placeholder(Value::str(group));
        text = format!("{}$${}{}", &text[..start], placeholder, &text[end + 1..]);
    }
    text
}

fn find_innermost_group(s: &str) -> Option<(usize, usize)> {
    let bytes: Vec<(usize, char)> = s.char_indices().collect();
    let mut stack: Vec<usize> = Vec::new();
    for (idx, (byte_pos, ch)) in bytes.iter().enumerate() {
        match ch {
            '(' | '[' | '{' => stack.push(idx),
            ')' | ']' | '}' => {
                if let Some(open_idx) = stack.pop() {
                    let start = bytes[open_idx].0;
                    let end_char_len = ch.len_utf8();
                    let end = *byte_pos + end_char_len - 1;
                    return Some((start, end));
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::VarStore;

    fn norm(input: &str) -> (String, Scope) {
        let mut registry = RuleRegistry::new();
        install_builtin_rules(&mut registry);
        let mut scope = Scope::new(VarStore::new());
        let out = normalize(input, &mut scope, &registry);
        (out, scope)
    }

    #[test]
    fn quoted_literal_becomes_placeholder() {
        let (out, scope) = norm(r#"echo "hello world""#);
        assert!(out.starts_with("echo $__p"));
        let name = out.trim_start_matches("echo $").to_string();
        assert!(matches!(scope.get_local(&name), Some(Value::Str(s)) if &**s == "hello world"));
    }

    #[test]
    fn math_operators_lose_surrounding_whitespace() {
        let (out, _scope) = norm("1 + 2 * 3");
        assert_eq!(out, "1+2*3");
    }

    #[test]
    fn sign_after_operator_is_extracted() {
        let (out, scope) = norm("1 + -2");
        let placeholder = out.trim_start_matches("1+").to_string();
        assert!(placeholder.starts_with('$'));
        let name = placeholder.trim_start_matches('$');
        assert!(matches!(scope.get_local(name), Some(Value::Int(-2))));
    }

    #[test]
    fn binary_minus_after_digit_is_untouched() {
        let (out, _scope) = norm("5-3");
        assert_eq!(out, "5-3");
    }

    #[test]
    fn brace_group_extraction_is_innermost_first() {
        let (out, scope) = norm("((1+2)*3)");
        // The inner group is extracted into a placeholder; the outer group
        // spans the whole text, so it is left as literal `(...)` text for
        // the converter's bracket step to unwrap directly.
        assert!(out.starts_with('(') && out.ends_with(')'));
        assert!(out.contains("$$"));
        let inner_start = out.find("$$").unwrap() + 2;
        let inner_name: String =
            out[inner_start..].chars().take_while(|c| c.is_alphanumeric() || *c == '_').collect();
        match scope.get_local(&inner_name) {
            Some(Value::Str(s)) => assert_eq!(&**s, "(1+2)"),
            other => panic!("expected inner placeholder string, got {:?}", other),
        }
    }

    #[test]
    fn whole_string_group_is_not_wrapped_in_a_placeholder() {
        let (out, _scope) = norm("(1+2)");
        assert_eq!(out, "(1+2)");
    }

    #[test]
    fn idempotent_on_already_normalized_input() {
        let (once, _) = norm("1+2");
        let (twice, _) = norm(&once);
        assert_eq!(once, twice);
    }
}
