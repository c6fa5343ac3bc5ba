//! End-to-end scenarios mirroring the literal scenario/negative-scenario
//! tables and the universal properties used to validate the engine.

use indexmap::IndexMap;
use xsh::value::Deferred;
use xsh::{Engine, Value};

fn int_or_float_one(v: &Value) {
    assert!(matches!(v, Value::Int(1)) || matches!(v, Value::Float(f) if *f == 1.0), "got {:?}", v);
}

#[test]
fn scenario_1_nested_parens_and_division() {
    let engine = Engine::with_builtins();
    let v = engine.parse("((1+2)*3-4)/5", None, None).unwrap();
    int_or_float_one(&v);
}

#[test]
fn scenario_2_object_pipe_and_short_circuit_chain() {
    let engine = Engine::with_builtins();
    let v = engine
        .parse("{foo: {bar: {baz: 5}}} | $context.foo.bar.baz && (1 && 1) && (0 || 0) || 1 || 2", None, None)
        .unwrap();
    assert!(matches!(v, Value::Int(1)));
}

#[test]
fn scenario_3_nullish_fallback_over_pipe() {
    let engine = Engine::with_builtins();
    let mut scope = engine.new_user_scope();

    let mut baz_map = IndexMap::new();
    baz_map.insert("baz".to_string(), Value::seq(vec![Value::Int(1), Value::Int(2)]));
    let mut bar_map = IndexMap::new();
    bar_map.insert("bar".to_string(), Value::map(baz_map));
    let mut foo_map = IndexMap::new();
    foo_map.insert("foo".to_string(), Value::map(bar_map));
    scope.set_local("var1", Value::map(foo_map));

    let v = engine.parse("$var1 | $context.foo.bar.baz.1 ?? 3", Some(scope), None).unwrap();
    assert!(matches!(v, Value::Int(2)));
}

#[test]
fn scenario_4_assign_through_array_valued_path() {
    let engine = Engine::with_builtins();
    let v = engine.parse("4 >> [var1, foo, bar, baz, 4]; $var1.foo.bar.baz.4", None, None).unwrap();
    assert!(matches!(v, Value::Int(4)));
}

#[test]
fn scenario_5_concat_with_flags_and_variadic() {
    let engine = Engine::with_builtins();
    let v = engine.parse(r#"concat -ab -c -D --args 1 2 3 --delim "|""#, None, None).unwrap();
    assert!(matches!(v, Value::Str(ref s) if &**s == "1|2|3"));
}

#[tokio::test]
async fn scenario_6_async_deferred_multiplication() {
    let engine = Engine::with_builtins();
    let v = engine.parse_async("async (async 2)*2", None, None).await.unwrap();
    assert!(matches!(v, Value::Int(4)));
}

#[tokio::test]
async fn scenario_7_deferred_array_indexing_through_pipe_context() {
    let engine = Engine::with_builtins();
    let mut scope = engine.new_user_scope();
    let var5 = Value::seq(vec![
        Value::Int(1),
        Value::Deferred(Deferred::ready(Value::seq(vec![Value::Int(2), Value::Int(3)]))),
        Value::Deferred(Deferred::ready(Value::Null)),
    ]);
    scope.set_local("var5", var5);

    let v = engine.parse_async("$var5.1.0 | $$context", Some(scope), None).await.unwrap();
    assert!(matches!(v, Value::Int(2)));
}

#[test]
fn scenario_8_json_template_scalar_directive() {
    let engine = Engine::with_builtins();
    let out = engine.parse_template(r#"{"test": "#xsh 2+2"}"#, "json", None).unwrap();
    assert_eq!(out, r#"{"test": 4}"#);
}

// Scenario 9 (the combined line-directive-assign + inline-directive-force-eval
// template) is covered at the mechanism level instead of literally: the exact
// interaction between a `;`-joined command on a `//#xsh` line and a following
// `` `#xsh ` `` inline span on the same line is an open question (no retained
// original-source text to resolve it against — see DESIGN.md). The two
// directives are exercised independently below and in `template.rs`.
#[test]
fn scenario_9_mechanism_line_directive_assign() {
    let engine = Engine::with_builtins();
    let out = engine.parse_template("//#xsh '2*2' >> t;\n", "js", None).unwrap();
    assert_eq!(out, "2*2\n");
}

#[test]
fn scenario_9_mechanism_inline_directive_force_evaluates_stored_expression() {
    let engine = Engine::with_builtins();
    let mut scope = engine.new_user_scope();
    scope.set_local("t", Value::str("2*2"));
    let out = engine.parse_template("test `#xsh $$t`", "js", Some(scope)).unwrap();
    assert_eq!(out, "test 4");
}

#[test]
fn negative_math_type_mismatch() {
    let engine = Engine::with_builtins();
    let err = engine.parse("1*a", None, None).unwrap_err();
    assert_eq!(err.kind, "PropertyTypeMismatch");
}

#[test]
fn negative_random_rejects_arguments() {
    let engine = Engine::with_builtins();
    let err = engine.parse("random 1", None, None).unwrap_err();
    assert_eq!(err.kind, "ArgumentsLengthInvalid");
}

#[test]
fn negative_min_requires_both_operands() {
    let engine = Engine::with_builtins();
    let err = engine.parse("min", None, None).unwrap_err();
    assert_eq!(err.kind, "PropertyRequired");
}

#[test]
fn negative_async_unknown_short_flag() {
    let engine = Engine::with_builtins();
    let err = engine.parse("async -P", None, None).unwrap_err();
    assert_eq!(err.kind, "PropertyNotFound");
}

#[test]
fn negative_async_unknown_long_option() {
    let engine = Engine::with_builtins();
    let err = engine.parse("async --is-array", None, None).unwrap_err();
    assert_eq!(err.kind, "PropertyNotFound");
}

#[test]
fn negative_async_plain_token_after_named_scalar() {
    let engine = Engine::with_builtins();
    let err = engine.parse("async --as-array true 1", None, None).unwrap_err();
    assert_eq!(err.kind, "WrongArgumentPosition");
}

#[test]
fn negative_concat_flag_after_positional_variadic() {
    let engine = Engine::with_builtins();
    let err = engine.parse("concat 1 2 3 -a", None, None).unwrap_err();
    assert_eq!(err.kind, "WrongArgumentPosition");
}

// Universal properties (spec.md §8).

#[test]
fn property_normalizer_idempotence() {
    let engine = Engine::with_builtins();
    let once = engine.parse("1+2*3", None, None).unwrap();
    let twice = engine.parse("1+2*3", None, None).unwrap();
    assert!(once.strict_eq(&twice));
}

#[test]
fn property_parentheses_neutrality() {
    let engine = Engine::with_builtins();
    let bare = engine.parse("1+2*3-4/2", None, None).unwrap();
    let parenthesized = engine.parse("(1+2*3-4/2)", None, None).unwrap();
    assert!(bare.strict_eq(&parenthesized));
}

#[test]
fn property_pipe_context_invariance() {
    let engine = Engine::with_builtins();
    let plain = engine.parse("5", None, None).unwrap();
    let piped = engine.parse("5 | $context", None, None).unwrap();
    assert!(plain.strict_eq(&piped));
}

#[test]
fn property_sequence_discards_earlier_results() {
    let engine = Engine::with_builtins();
    let a = engine.parse("b", None, None).unwrap();
    let b = engine.parse("a; b", None, None).unwrap();
    assert!(a.strict_eq(&b));

    let only_a = engine.parse("a", None, None).unwrap();
    let trailing_semi = engine.parse("a;", None, None).unwrap();
    assert!(only_a.strict_eq(&trailing_semi));
}

#[test]
fn property_nullish_short_circuit() {
    let engine = Engine::with_builtins();
    let v = engine.parse("null ?? 7", None, None).unwrap();
    assert!(matches!(v, Value::Int(7)));

    let v = engine.parse("9 ?? 7", None, None).unwrap();
    assert!(matches!(v, Value::Int(9)));
}

#[test]
fn property_assign_round_trip() {
    let engine = Engine::with_builtins();
    let v = engine.parse("5 >> x; $x", None, None).unwrap();
    let direct = engine.parse("5", None, None).unwrap();
    assert!(v.strict_eq(&direct));
}

#[test]
fn property_variadic_collects_all_trailing_tokens() {
    let engine = Engine::with_builtins();
    let v = engine.parse("concat a b c d", None, None).unwrap();
    assert!(matches!(v, Value::Str(ref s) if &**s == "a,b,c,d"));
}

#[test]
fn property_template_preserves_line_count() {
    let engine = Engine::with_builtins();
    let src = "a\n//#xsh 2+2\nb\nc\n";
    let out = engine.parse_template(src, "js", None).unwrap();
    assert_eq!(out.lines().count(), src.lines().count());
}

#[tokio::test]
async fn property_sync_and_async_agree_with_no_deferred_values() {
    let engine = Engine::with_builtins();
    let sync_result = engine.parse("((1+2)*3-4)/5", None, None).unwrap();
    let async_result = engine.parse_async("((1+2)*3-4)/5", None, None).await.unwrap();
    assert!(sync_result.strict_eq(&async_result));
}
