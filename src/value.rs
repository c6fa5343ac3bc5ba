//! The dynamic value type.
//!
//! A tagged sum covering every shape the converter, math evaluator and
//! command dispatcher can produce. Mirrors the data model of spec.md §3.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::future::Shared;
use futures::FutureExt;
use indexmap::IndexMap;

use crate::error::{EngineError, EngineErrorPayload};

/// A boxed, `'static` future yielding a resolved `Value` or a propagated error.
pub type BoxValueFuture = Pin<Box<dyn Future<Output = Result<Value, EngineErrorPayload>> + Send>>;

/// A deferred (not-yet-available) value. Cloning a `Deferred` shares the same
/// underlying computation — awaiting it from two places does not re-run it.
#[derive(Clone)]
pub struct Deferred(pub Shared<BoxValueFuture>);

impl Deferred {
    pub fn new(fut: BoxValueFuture) -> Self {
        Self(fut.shared())
    }

    /// A deferred value that is already resolved — used by hosts seeding a
    /// scope with synthetic async values, and by the `async` builtin command.
    pub fn ready(value: Value) -> Self {
        Self::new(Box::pin(async move { Ok(value) }))
    }

    /// Poll once without registering a waker. `None` means "still pending";
    /// see SPEC_FULL.md §5 for why sync mode treats that as pass-through.
    pub fn now_or_never(&self) -> Option<Result<Value, EngineErrorPayload>> {
        self.0.clone().now_or_never()
    }

    pub async fn resolve(&self) -> Result<Value, EngineErrorPayload> {
        self.0.clone().await
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Deferred(..)")
    }
}

/// A native or engine-bound callable. Always async-shaped; see
/// SPEC_FULL.md §5 for how sync mode drives it without blocking.
pub type NativeFn = Arc<
    dyn Fn(Vec<Value>) -> Pin<Box<dyn Future<Output = Result<Value, EngineErrorPayload>> + Send>>
        + Send
        + Sync,
>;

#[derive(Clone)]
pub struct Func {
    pub name: Option<String>,
    pub call: NativeFn,
    /// Present when this function was obtained through a `this`-bound
    /// dotted-path lookup (`$obj.method`); the receiver is re-supplied on
    /// invocation. See spec.md §4.2 and §9 ("this-binding dotted-path lookup").
    pub receiver: Option<Box<Value>>,
}

impl fmt::Debug for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Func")
            .field("name", &self.name)
            .field("bound", &self.receiver.is_some())
            .finish()
    }
}

/// The dynamic value type threaded through normalization, conversion, math
/// and command dispatch. See spec.md §3 ("Value") and §9 ("Dynamic value
/// type — represent as a tagged sum").
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Undefined,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Seq(Arc<Vec<Value>>),
    Map(Arc<IndexMap<String, Value>>),
    Fn(Func),
    Deferred(Deferred),
}

impl Value {
    pub fn str(s: impl Into<Arc<str>>) -> Self {
        Value::Str(s.into())
    }

    pub fn seq(items: Vec<Value>) -> Self {
        Value::Seq(Arc::new(items))
    }

    pub fn map(entries: IndexMap<String, Value>) -> Self {
        Value::Map(Arc::new(entries))
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Null | Value::Undefined)
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Value::Deferred(_))
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Fn(_))
    }

    /// JS-like truthiness: `null`, `undefined`, `false`, `0`, `0.0`, `""`
    /// are falsy; everything else (including empty arrays/objects) is truthy.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null | Value::Undefined => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Seq(_) | Value::Map(_) | Value::Fn(_) | Value::Deferred(_) => true,
        }
    }

    pub fn type_tag(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::Float(_) => "number",
            Value::Str(_) => "string",
            Value::Seq(_) => "array",
            Value::Map(_) => "object",
            Value::Fn(_) => "function",
            Value::Deferred(_) => "deferred",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Str(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// JS-like string coercion, used by `+` string concatenation and by
    /// template directive formatting (spec.md §4.10).
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Undefined => "undefined".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() {
                    format!("{}", *f as i64)
                } else {
                    f.to_string()
                }
            }
            Value::Str(s) => s.to_string(),
            Value::Seq(items) => items
                .iter()
                .map(|v| v.to_display_string())
                .collect::<Vec<_>>()
                .join(","),
            Value::Map(_) => "[object Object]".to_string(),
            Value::Fn(_) => "[function]".to_string(),
            Value::Deferred(_) => "[deferred]".to_string(),
        }
    }

    /// Renders the value as a `serde_json::Value` (used by the JSON template
    /// directive and by `--json` CLI output). Non-serializable variants
    /// (`Fn`, `Deferred`) collapse to `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null | Value::Undefined | Value::Fn(_) | Value::Deferred(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::json!(*i),
            Value::Float(f) => serde_json::json!(*f),
            Value::Str(s) => serde_json::Value::String(s.to_string()),
            Value::Seq(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(m) => {
                serde_json::Value::Object(m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
            }
        }
    }

    /// Loose (`==`) equality: coerces across null/undefined/number/string/bool.
    pub fn loose_eq(&self, other: &Value) -> bool {
        use Value::*;
        match (self, other) {
            (Null | Undefined, Null | Undefined) => true,
            (Null | Undefined, _) | (_, Null | Undefined) => false,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Int(a), Float(b)) | (Float(b), Int(a)) => (*a as f64) == *b,
            (Bool(a), Bool(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (Bool(_), _) | (_, Bool(_)) => self.as_f64() == other.as_f64(),
            (Int(_) | Float(_), Str(_)) | (Str(_), Int(_) | Float(_)) => {
                self.as_f64().zip(other.as_f64()).map(|(a, b)| a == b).unwrap_or(false)
            }
            _ => self.strict_eq(other),
        }
    }

    /// Strict (`===`) equality: same variant and value.
    pub fn strict_eq(&self, other: &Value) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Undefined, Undefined) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Int(a), Float(b)) | (Float(b), Int(a)) => (*a as f64) == *b,
            (Str(a), Str(b)) => a == b,
            (Seq(a), Seq(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.strict_eq(y))
            }
            (Map(a), Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).map(|bv| bv.strict_eq(v)).unwrap_or(false))
            }
            _ => false,
        }
    }

    pub fn try_into_result(self) -> Result<Value, EngineError> {
        Ok(self)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s.into())
    }
}

impl<'a> From<&'a str> for Value {
    fn from(s: &'a str) -> Self {
        Value::Str(s.into())
    }
}
