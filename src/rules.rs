//! Rule Registry (spec.md §4.1).
//!
//! A global (per-`Engine`), categorized, order-stable store of rewrite
//! rules. Categories: `parse`, `convert`, `math`, `command`, `template`.
//! Rules are appended and re-sorted by `order` ascending after each
//! registration (stable sort — insertion order breaks ties), mirroring the
//! teacher's `CommandRegistry` (`src/commands/registry.rs`) in shape, but
//! keyed by category rather than by a single name.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::converter::Executor;
use crate::error::EngineErrorPayload;
use crate::mode::Mode;
use crate::value::Value;

/// Per-category rule kinds. `parse`/`template` rules rewrite text; `math`
/// rules fold operand pairs; `command` rules drive the splitter; `convert`
/// rules classify/evaluate a scalar token. All are represented uniformly as
/// a `Rule` with an `order`, optional `key`/`regexp`, and a callback whose
/// signature depends on the category (dispatched by the caller, not by this
/// module — see `normalizer.rs`/`converter.rs`/`math.rs`/`splitter.rs`).
#[derive(Clone)]
pub struct Rule<Cb> {
    pub name: Option<String>,
    pub key: Option<String>,
    pub order: i32,
    pub meta: RuleMeta,
    pub callback: Cb,
}

impl<Cb> fmt::Debug for Rule<Cb> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("order", &self.order)
            .finish()
    }
}

/// Free-form per-category metadata (spec.md §3's "Rule" record `meta`
/// field) — for template rules, the list of applicable file types.
#[derive(Clone, Default)]
pub struct RuleMeta {
    pub types: Option<Vec<String>>,
}

impl RuleMeta {
    pub fn for_types(types: &[&str]) -> Self {
        Self { types: Some(types.iter().map(|s| s.to_string()).collect()) }
    }

    pub fn applies_to(&self, ty: &str) -> bool {
        match &self.types {
            None => true,
            Some(types) => types.iter().any(|t| t == ty),
        }
    }
}

/// An ordered, append-and-resort store for one rule category.
#[derive(Clone)]
pub struct RuleSet<Cb> {
    rules: Vec<Rule<Cb>>,
    insertion: usize,
}

impl<Cb: Clone> RuleSet<Cb> {
    pub fn new() -> Self {
        Self { rules: Vec::new(), insertion: 0 }
    }

    pub fn register(&mut self, mut rule: Rule<Cb>) {
        if rule.name.is_none() {
            rule.name = Some(format!("rule#{}", self.insertion));
        }
        self.insertion += 1;
        self.rules.push(rule);
        // Stable sort by `order` ascending; insertion order breaks ties
        // because `sort_by_key` is stable in Rust's standard library.
        self.rules.sort_by_key(|r| r.order);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule<Cb>> {
        self.rules.iter()
    }

    pub fn iter_for_type<'a>(&'a self, ty: &'a str) -> impl Iterator<Item = &'a Rule<Cb>> {
        self.rules.iter().filter(move |r| r.meta.applies_to(ty))
    }
}

impl<Cb: Clone> Default for RuleSet<Cb> {
    fn default() -> Self {
        Self::new()
    }
}

/// A parse-category (normalizer) rewrite: consumes the whole buffer plus a
/// mutable scope to stash placeholders, returns the rewritten string.
pub type ParseCallback = Arc<dyn Fn(&str, &mut crate::scope::Scope) -> String + Send + Sync>;

/// A command-category (splitter) operator: the literal text key used to
/// split, tested via `Rule::key`. The callback performs the bottom-up fold
/// over already-evaluated children — see `executor.rs`.
pub type CommandFoldCallback = Arc<
    dyn Fn(
            Vec<Value>,
            &mut crate::scope::Scope,
            Mode,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = Result<Value, EngineErrorPayload>> + Send>,
        > + Send
        + Sync,
>;

/// A convert-category ladder entry: may `Skip` ("not me, try the next
/// rule") or produce a concrete value.
pub type ConvertCallback = Arc<
    dyn Fn(
            String,
            &mut crate::scope::Scope,
            Mode,
        ) -> std::pin::Pin<
            Box<
                dyn std::future::Future<Output = Result<Option<Value>, EngineErrorPayload>>
                    + Send,
            >,
        > + Send
        + Sync,
>;

/// A math-category operator: left-fold step `(acc, operand) -> acc`.
pub type MathCallback =
    Arc<dyn Fn(Value, Value) -> Result<Value, EngineErrorPayload> + Send + Sync>;

/// A template-category directive: scans the whole buffer for its own
/// occurrences and rewrites them, re-entering the full pipeline through
/// `exec` to evaluate each captured command (spec.md §4.10). See
/// `template.rs`.
pub type TemplateCallback = Arc<
    dyn for<'a> Fn(
            &'a str,
            &'a mut crate::scope::Scope,
            Mode,
            &'a dyn Executor,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = Result<String, EngineErrorPayload>> + Send + 'a>,
        > + Send
        + Sync,
>;

/// The engine-wide rule registry, one `RuleSet` per category.
#[derive(Clone, Default)]
pub struct RuleRegistry {
    pub parse: RuleSet<ParseCallback>,
    pub command: RuleSet<CommandFoldCallback>,
    pub convert: RuleSet<ConvertCallback>,
    pub math: RuleSet<MathCallback>,
    pub template: RuleSet<TemplateCallback>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}
