//! Sync/async duality.
//!
//! See SPEC_FULL.md §5 for the design: one `async fn` implementation per
//! evaluation step, with `Mode` choosing between a real `.await` and a
//! single non-blocking poll (`now_or_never`) at each suspension point named
//! in spec.md §5.

use crate::error::EngineErrorPayload;
use crate::value::{Deferred, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Sync,
    Async,
}

impl Mode {
    /// Resolve a deferred value per this mode's suspension rule.
    /// `Async` always awaits; `Sync` polls once and passes the original
    /// value through untouched if it isn't immediately ready.
    pub async fn settle(self, value: Value) -> Result<Value, EngineErrorPayload> {
        match value {
            Value::Deferred(d) => self.settle_deferred(d).await,
            other => Ok(other),
        }
    }

    async fn settle_deferred(self, d: Deferred) -> Result<Value, EngineErrorPayload> {
        match self {
            Mode::Async => d.resolve().await,
            Mode::Sync => match d.now_or_never() {
                Some(result) => result,
                None => Ok(Value::Deferred(d)),
            },
        }
    }
}
