//! Math Evaluator (spec.md §4.7).
//!
//! Left-fold over an operand list under a single operator: `acc = x0`, then
//! `acc = op(acc, x_i)` for each subsequent operand. Operator semantics
//! follow spec.md's table exactly; numeric coercion goes through
//! `Value::as_f64`.

use crate::error::EngineErrorPayload;
use crate::value::Value;

/// The fixed operator list, longest-first so `==` isn't matched inside
/// `===` and so on (spec.md §6.1's precedence list, low→high collapsed to
/// the single list the converter scans left-to-right for "first operator
/// that appears").
pub const MATH_OPERATORS: &[&str] =
    &["===", "!==", "==", "!=", ">=", "<=", ">", "<", "+", "-", "*", "/", "%"];

/// Precedence tiers, lowest first, matching spec.md §6.1's grouping
/// (`===`/`!==`, `==`/`!=`, `>=`/`<=`, `>`/`<`, `+`/`-`, `*`/`/`/`%`).
/// Operators in the same tier fold left-to-right against each other (e.g.
/// `3+4-2` folds as `(3+4)-2`, not split apart by type).
pub const MATH_TIERS: &[&[&str]] = &[
    &["===", "!=="],
    &["==", "!="],
    &[">=", "<="],
    &[">", "<"],
    &["+", "-"],
    &["*", "/", "%"],
];

fn type_mismatch(msg: impl Into<String>) -> EngineErrorPayload {
    EngineErrorPayload::new("PropertyTypeMismatch", msg)
}

fn math_invalid(msg: impl Into<String>) -> EngineErrorPayload {
    EngineErrorPayload::new("MathResultInvalid", msg)
}

/// Apply one step of the fold: `op(acc, operand)`.
pub fn apply(op: &str, acc: Value, operand: Value) -> Result<Value, EngineErrorPayload> {
    match op {
        "+" => add(acc, operand),
        "-" => numeric_op(acc, operand, "-", |a, b| a - b),
        "*" => numeric_op(acc, operand, "*", |a, b| a * b),
        "/" => numeric_op(acc, operand, "/", |a, b| a / b),
        "%" => numeric_op(acc, operand, "%", |a, b| a % b),
        ">" => compare(acc, operand, |o| o == std::cmp::Ordering::Greater),
        "<" => compare(acc, operand, |o| o == std::cmp::Ordering::Less),
        ">=" => compare(acc, operand, |o| o != std::cmp::Ordering::Less),
        "<=" => compare(acc, operand, |o| o != std::cmp::Ordering::Greater),
        "==" => Ok(Value::Bool(acc.loose_eq(&operand))),
        "!=" => Ok(Value::Bool(!acc.loose_eq(&operand))),
        "===" => Ok(Value::Bool(acc.strict_eq(&operand))),
        "!==" => Ok(Value::Bool(!acc.strict_eq(&operand))),
        other => Err(EngineErrorPayload::new("ParameterTypeInvalid", format!("unknown operator '{}'", other))),
    }
}

/// Left-fold the full operand list under `op`.
pub fn fold(op: &str, mut operands: Vec<Value>) -> Result<Value, EngineErrorPayload> {
    if operands.is_empty() {
        return Err(math_invalid("math fold received no operands"));
    }
    let mut acc = operands.remove(0);
    for operand in operands {
        acc = apply(op, acc, operand)?;
    }
    if matches!(acc, Value::Undefined) {
        return Err(math_invalid("math fold produced undefined"));
    }
    Ok(acc)
}

/// `+`: numeric add; sequence⧺sequence concatenates; mapping⧺mapping merges
/// right-biased; string + anything concatenates via display coercion.
fn add(a: Value, b: Value) -> Result<Value, EngineErrorPayload> {
    match (&a, &b) {
        (Value::Seq(x), Value::Seq(y)) => {
            let mut out = (**x).clone();
            out.extend((**y).clone());
            Ok(Value::seq(out))
        }
        (Value::Map(x), Value::Map(y)) => {
            let mut out = (**x).clone();
            for (k, v) in y.iter() {
                out.insert(k.clone(), v.clone());
            }
            Ok(Value::map(out))
        }
        (Value::Str(_), _) | (_, Value::Str(_)) => {
            Ok(Value::str(format!("{}{}", a.to_display_string(), b.to_display_string())))
        }
        _ => numeric_op(a, b, "+", |x, y| x + y),
    }
}

fn numeric_op(a: Value, b: Value, name: &str, f: impl Fn(f64, f64) -> f64) -> Result<Value, EngineErrorPayload> {
    let (x, y) = (
        a.as_f64().ok_or_else(|| type_mismatch(format!("left operand of '{}' is not numeric", name)))?,
        b.as_f64().ok_or_else(|| type_mismatch(format!("right operand of '{}' is not numeric", name)))?,
    );
    let result = f(x, y);
    let both_int = matches!(a, Value::Int(_)) && matches!(b, Value::Int(_)) && name != "/";
    if both_int && result.fract() == 0.0 {
        Ok(Value::Int(result as i64))
    } else {
        Ok(Value::Float(result))
    }
}

fn compare(a: Value, b: Value, accept: impl Fn(std::cmp::Ordering) -> bool) -> Result<Value, EngineErrorPayload> {
    let (x, y) = (
        a.as_f64().ok_or_else(|| type_mismatch("comparison operand is not numeric"))?,
        b.as_f64().ok_or_else(|| type_mismatch("comparison operand is not numeric"))?,
    );
    let ordering = x.partial_cmp(&y).ok_or_else(|| type_mismatch("comparison operand is NaN"))?;
    Ok(Value::Bool(accept(ordering)))
}

/// First operator from `MATH_OPERATORS` that occurs in `s`, with its byte
/// offset. Used only as a cheap "does this look like a math expression"
/// presence check (e.g. by the converter's bare-identifier test); the
/// actual split point is chosen by `split_first_tier`, which respects
/// precedence instead of leftmost string position.
pub fn first_operator_in(s: &str) -> Option<(usize, &'static str)> {
    let mut best: Option<(usize, &'static str)> = None;
    for op in MATH_OPERATORS {
        if let Some(idx) = s.find(op) {
            match best {
                Some((best_idx, _)) if idx >= best_idx => {}
                _ => best = Some((idx, op)),
            }
        }
    }
    best
}

/// Splits `s` on every top-level occurrence of an operator belonging to the
/// lowest-precedence tier present in `s` (spec.md §4.6 step 5: "choose the
/// first operator that appears in the list, split on it... then left-fold").
/// Within a tier, operators interleave correctly: `3+4-2` tokenizes as
/// `["3", "+", "4", "-", "2"]`, not split apart by operator identity.
///
/// Returns `None` if no tier's operators occur anywhere in `s`.
pub fn split_first_tier(s: &str) -> Option<(Vec<String>, Vec<&'static str>)> {
    let tier = MATH_TIERS.iter().find(|tier| tier.iter().any(|op| s.contains(op)))?;
    let mut sorted_ops: Vec<&'static str> = tier.to_vec();
    sorted_ops.sort_by_key(|op| std::cmp::Reverse(op.len()));

    let mut operands = Vec::new();
    let mut ops = Vec::new();
    let mut last = 0usize;
    let bytes = s.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        if let Some(op) = sorted_ops.iter().find(|op| s[i..].starts_with(**op)) {
            operands.push(s[last..i].to_string());
            ops.push(*op);
            i += op.len();
            last = i;
        } else {
            i += 1;
            while i < bytes.len() && (bytes[i] & 0xC0) == 0x80 {
                i += 1;
            }
        }
    }
    operands.push(s[last..].to_string());
    if ops.is_empty() {
        None
    } else {
        Some((operands, ops))
    }
}

/// Left-fold an operand/operator run produced by `split_first_tier`, where
/// each fold step may apply a *different* operator from the same tier
/// (`ops[i]` is applied between `operands[i]` and `operands[i + 1]`).
pub fn fold_with_ops(ops: &[&str], mut operands: Vec<Value>) -> Result<Value, EngineErrorPayload> {
    if operands.len() != ops.len() + 1 {
        return Err(math_invalid("math fold operand/operator count mismatch"));
    }
    let mut acc = operands.remove(0);
    for op in ops {
        let rhs = operands.remove(0);
        acc = apply(op, acc, rhs)?;
    }
    if matches!(acc, Value::Undefined) {
        return Err(math_invalid("math fold produced undefined"));
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_add_stays_int() {
        let r = fold("+", vec![Value::Int(1), Value::Int(2), Value::Int(3)]).unwrap();
        assert!(matches!(r, Value::Int(6)));
    }

    #[test]
    fn division_is_always_float() {
        let r = fold("/", vec![Value::Int(6), Value::Int(3)]).unwrap();
        assert!(matches!(r, Value::Int(2)) == false);
        assert!(matches!(r, Value::Float(f) if f == 2.0));
    }

    #[test]
    fn string_concat_coerces_rhs() {
        let r = fold("+", vec![Value::str("x="), Value::Int(5)]).unwrap();
        assert!(matches!(r, Value::Str(s) if &*s == "x=5"));
    }

    #[test]
    fn sequence_concat() {
        let r = fold("+", vec![Value::seq(vec![Value::Int(1)]), Value::seq(vec![Value::Int(2)])]).unwrap();
        match r {
            Value::Seq(v) => assert_eq!(v.len(), 2),
            other => panic!("expected seq, got {:?}", other),
        }
    }

    #[test]
    fn subtract_non_numeric_is_type_mismatch() {
        let err = fold("-", vec![Value::Int(1), Value::str("a")]).unwrap_err();
        assert_eq!(err.kind, "PropertyTypeMismatch");
    }

    #[test]
    fn loose_eq_coerces_number_and_string() {
        let r = fold("==", vec![Value::Int(1), Value::str("1")]).unwrap();
        assert!(matches!(r, Value::Bool(true)));
    }

    #[test]
    fn strict_eq_rejects_cross_type() {
        let r = fold("===", vec![Value::Int(1), Value::str("1")]).unwrap();
        assert!(matches!(r, Value::Bool(false)));
    }

    #[test]
    fn first_operator_picks_leftmost_longest_match() {
        let (idx, op) = first_operator_in("a===b").unwrap();
        assert_eq!(idx, 1);
        assert_eq!(op, "===");
    }

    #[test]
    fn split_first_tier_prefers_lowest_precedence_present() {
        // '-' and '*' both occur; '+'/'-' is the lower-precedence tier, so
        // it splits first even though '*' appears earlier in the string.
        let (operands, ops) = split_first_tier("3*3-4").unwrap();
        assert_eq!(operands, vec!["3*3", "4"]);
        assert_eq!(ops, vec!["-"]);
    }

    #[test]
    fn split_first_tier_interleaves_same_tier_operators() {
        let (operands, ops) = split_first_tier("3+4-2").unwrap();
        assert_eq!(operands, vec!["3", "4", "2"]);
        assert_eq!(ops, vec!["+", "-"]);
    }

    #[test]
    fn fold_with_ops_applies_left_to_right() {
        let (operands, ops) = split_first_tier("3-4+2").unwrap();
        let values: Vec<Value> = operands.iter().map(|s| Value::Int(s.parse().unwrap())).collect();
        let r = fold_with_ops(&ops, values).unwrap();
        // (3-4)+2 == 1
        assert!(matches!(r, Value::Int(1)));
    }
}
