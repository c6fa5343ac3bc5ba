//! Error taxonomy.
//!
//! One small struct per failure kind (spec.md §7), unified by `EngineError`,
//! following the teacher's `src/interpreter/errors.rs` pattern of a struct
//! per control/failure kind plus a wrapping enum — but using `thiserror`
//! instead of hand-written `Display`/`Error` impls, since `thiserror` is
//! already part of the teacher's own dependency stack (`src/parser/types.rs`,
//! `src/fs/types.rs`).

use serde::Serialize;
use thiserror::Error;

/// Structured payload embedded in every user-visible failure, per spec.md §7
/// ("the payload as formatted JSON for diagnostics").
#[derive(Debug, Clone, Serialize)]
pub struct EngineErrorPayload {
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl EngineErrorPayload {
    pub fn new(kind: &'static str, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), detail: None }
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// Every user-visible failure kind from spec.md §7, plus the two ambient
/// additions described in SPEC_FULL.md §7.
#[derive(Debug, Error, Clone)]
pub enum EngineError {
    #[error("property not found: {0}")]
    PropertyNotFound(String),

    #[error("property type mismatch: {0}")]
    PropertyTypeMismatch(String),

    #[error("property required: {0}")]
    PropertyRequired(String),

    #[error("invalid parameter: {0}")]
    ParameterTypeInvalid(String),

    #[error("invalid variable type rule: {0}")]
    VariableTypeInvalid(String),

    #[error("assertion failed: {0}")]
    AssertFailed(String),

    #[error("invalid arguments length: {0}")]
    ArgumentsLengthInvalid(String),

    #[error("wrong argument position: {0}")]
    WrongArgumentPosition(String),

    #[error("invalid math result: {0}")]
    MathResultInvalid(String),

    #[error("recursion limit exceeded: {0}")]
    RecursionLimit(String),

    #[error("command failed: {0}")]
    Command(String),
}

impl EngineError {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::PropertyNotFound(_) => "PropertyNotFound",
            EngineError::PropertyTypeMismatch(_) => "PropertyTypeMismatch",
            EngineError::PropertyRequired(_) => "PropertyRequired",
            EngineError::ParameterTypeInvalid(_) => "ParameterTypeInvalid",
            EngineError::VariableTypeInvalid(_) => "VariableTypeInvalid",
            EngineError::AssertFailed(_) => "AssertFailed",
            EngineError::ArgumentsLengthInvalid(_) => "ArgumentsLengthInvalid",
            EngineError::WrongArgumentPosition(_) => "WrongArgumentPosition",
            EngineError::MathResultInvalid(_) => "MathResultInvalid",
            EngineError::RecursionLimit(_) => "RecursionLimit",
            EngineError::Command(_) => "Command",
        }
    }

    pub fn payload(&self) -> EngineErrorPayload {
        EngineErrorPayload::new(self.kind(), self.to_string())
    }
}

impl From<EngineError> for EngineErrorPayload {
    fn from(e: EngineError) -> Self {
        e.payload()
    }
}

impl From<EngineErrorPayload> for EngineError {
    fn from(p: EngineErrorPayload) -> Self {
        match p.kind {
            "PropertyNotFound" => EngineError::PropertyNotFound(p.message),
            "PropertyTypeMismatch" => EngineError::PropertyTypeMismatch(p.message),
            "PropertyRequired" => EngineError::PropertyRequired(p.message),
            "ParameterTypeInvalid" => EngineError::ParameterTypeInvalid(p.message),
            "VariableTypeInvalid" => EngineError::VariableTypeInvalid(p.message),
            "AssertFailed" => EngineError::AssertFailed(p.message),
            "ArgumentsLengthInvalid" => EngineError::ArgumentsLengthInvalid(p.message),
            "WrongArgumentPosition" => EngineError::WrongArgumentPosition(p.message),
            "MathResultInvalid" => EngineError::MathResultInvalid(p.message),
            "RecursionLimit" => EngineError::RecursionLimit(p.message),
            _ => EngineError::Command(p.message),
        }
    }
}

/// Internal short-circuit signal used only inside the converter/math
/// ladders (spec.md §4.11). Never escapes the engine boundary: it is caught
/// strictly at rule-ladder boundaries and converted into either the next
/// ladder entry being tried, or a real `EngineError`.
pub(crate) enum Continue<T> {
    Done(T),
    Skip,
}
