//! Command Executor (spec.md §4.9) — bottom-up evaluation of the splitter's
//! `SubCommand` tree, and the `Executor` trait's re-entry point used by
//! `converter.rs` for `(...)` groups and bare command-expression fallback.

use async_trait::async_trait;

use crate::commands::{bind_command, CommandRegistry};
use crate::converter::{self, Executor};
use crate::error::EngineErrorPayload;
use crate::mode::Mode;
use crate::normalizer;
use crate::rules::RuleRegistry;
use crate::scope::{self, Scope, CONTEXT};
use crate::splitter::{self, Operator, SubCommand};
use crate::value::Value;

/// Everything `exec`/`parse` needs: the rule registry (normalizer, math,
/// convert rules) and the command registry. Held by reference for the
/// duration of one top-level `parse` call — see `engine.rs`.
pub struct Pipeline<'a> {
    pub rules: &'a RuleRegistry,
    pub commands: &'a CommandRegistry,
}

#[async_trait]
impl<'a> Executor for Pipeline<'a> {
    async fn exec(&self, input: String, scope: &mut Scope, mode: Mode) -> Result<Value, EngineErrorPayload> {
        self.run(&input, scope, mode).await
    }

    fn is_command(&self, name: &str) -> bool {
        self.commands.contains(name)
    }

    async fn invoke_zero_arg(
        &self,
        name: &str,
        scope: &mut Scope,
        mode: Mode,
    ) -> Result<Value, EngineErrorPayload> {
        self.invoke_command(name, vec![], scope, mode).await
    }
}

impl<'a> Pipeline<'a> {
    pub fn new(rules: &'a RuleRegistry, commands: &'a CommandRegistry) -> Self {
        Self { rules, commands }
    }

    /// Normalize, split, and evaluate `input` bottom-up. This is the engine's
    /// single entry point for any sub-expression, recursive or top-level.
    pub async fn run(&self, input: &str, scope: &mut Scope, mode: Mode) -> Result<Value, EngineErrorPayload> {
        let normalized = normalizer::normalize(input, scope, self.rules);
        let tree = splitter::parse_command(&normalized);
        self.eval_tree(&tree, scope, mode).await
    }

    fn eval_tree<'b>(
        &'b self,
        node: &'b SubCommand,
        scope: &'b mut Scope,
        mode: Mode,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, EngineErrorPayload>> + Send + 'b>> {
        Box::pin(async move {
            scope.enter_recursion()?;
            let result = match node {
                SubCommand::Leaf(text) => converter::convert(text, scope, mode, self).await,
                SubCommand::Node { operator, children } => self.eval_operator(*operator, children, scope, mode).await,
            };
            scope.exit_recursion();
            result
        })
    }

    async fn eval_operator(
        &self,
        operator: Operator,
        children: &[SubCommand],
        scope: &mut Scope,
        mode: Mode,
    ) -> Result<Value, EngineErrorPayload> {
        match operator {
            Operator::Sequence => self.fold_sequence(children, scope, mode).await,
            Operator::Fail => self.fold_short_circuit(children, scope, mode, |v| v.truthy()).await,
            Operator::Success => self.fold_short_circuit(children, scope, mode, |v| !v.truthy()).await,
            Operator::Nullish => self.fold_nullish(children, scope, mode).await,
            Operator::Pipe => self.fold_pipe(children, scope, mode).await,
            Operator::Assign => self.fold_assign(children, scope, mode).await,
            Operator::Param => self.fold_param(children, scope, mode).await,
        }
    }

    /// `;` — execute each child in order; result is the last non-empty
    /// child's result (children yielding `Undefined` are skipped).
    async fn fold_sequence(
        &self,
        children: &[SubCommand],
        scope: &mut Scope,
        mode: Mode,
    ) -> Result<Value, EngineErrorPayload> {
        let mut result = Value::Undefined;
        for child in children {
            let v = self.eval_tree(child, scope, mode).await?;
            if !matches!(v, Value::Undefined) {
                result = v;
            }
        }
        Ok(result)
    }

    /// `||` returns the first truthy result (else the last); `&&` returns
    /// the first falsy result (else the last). `accept` decides whether a
    /// result short-circuits the fold.
    async fn fold_short_circuit(
        &self,
        children: &[SubCommand],
        scope: &mut Scope,
        mode: Mode,
        accept: impl Fn(&Value) -> bool,
    ) -> Result<Value, EngineErrorPayload> {
        let mut last = Value::Undefined;
        for (i, child) in children.iter().enumerate() {
            let v = self.eval_tree(child, scope, mode).await?;
            if accept(&v) {
                return Ok(v);
            }
            if i == children.len() - 1 {
                last = v;
            }
        }
        Ok(last)
    }

    /// `??` — first non-null(ish) result, else the last.
    async fn fold_nullish(
        &self,
        children: &[SubCommand],
        scope: &mut Scope,
        mode: Mode,
    ) -> Result<Value, EngineErrorPayload> {
        let mut last = Value::Undefined;
        for (i, child) in children.iter().enumerate() {
            let v = self.eval_tree(child, scope, mode).await?;
            if !v.is_nullish() {
                return Ok(v);
            }
            if i == children.len() - 1 {
                last = v;
            }
        }
        Ok(last)
    }

    /// `|` — execute child 0, then thread the result through `scope.context`
    /// for each subsequent child, restoring the prior context afterward.
    async fn fold_pipe(
        &self,
        children: &[SubCommand],
        scope: &mut Scope,
        mode: Mode,
    ) -> Result<Value, EngineErrorPayload> {
        let mut result = self.eval_tree(&children[0], scope, mode).await?;
        for child in &children[1..] {
            let previous = scope.locals.get(CONTEXT).cloned();
            scope.set_local(CONTEXT, result.clone());
            result = self.eval_tree(child, scope, mode).await?;
            match previous {
                Some(p) => scope.set_local(CONTEXT, p),
                None => {
                    scope.locals.remove(CONTEXT);
                }
            }
        }
        Ok(result)
    }

    /// `>>` — execute child 0 to obtain the value, then each subsequent
    /// child to obtain a name, assigning the value via `setVar`. Per
    /// spec.md §4.2, `setVar`'s path is "either a simple name or a sequence
    /// of keys": when the name expression evaluates to an array (e.g.
    /// `>> [var1, foo, bar]`), its elements *are* the path segments; a
    /// scalar name is instead dot-split the usual way (`>> a.b.c`).
    async fn fold_assign(
        &self,
        children: &[SubCommand],
        scope: &mut Scope,
        mode: Mode,
    ) -> Result<Value, EngineErrorPayload> {
        let result = self.eval_tree(&children[0], scope, mode).await?;
        for child in &children[1..] {
            let name_value = self.eval_tree(child, scope, mode).await?;
            let path = assign_path(&name_value);
            scope::set_var(&path, result.clone(), scope)?;
        }
        Ok(result)
    }

    /// ␠ (param/application) — convert each child as a value; if the first
    /// is callable, invoke it with the rest as arguments; else wrap as a
    /// sequence when more than one child, or return the sole element.
    async fn fold_param(
        &self,
        children: &[SubCommand],
        scope: &mut Scope,
        mode: Mode,
    ) -> Result<Value, EngineErrorPayload> {
        // A multi-child application whose head is a bare registered command
        // name is dispatched directly with the remaining children as raw
        // tokens. Converting the head through the normal ladder first would
        // trigger its own zero-arg auto-invocation (spec.md §4.6 step 11)
        // before it ever sees these arguments.
        if children.len() > 1 {
            if let SubCommand::Leaf(head_text) = &children[0] {
                if converter::is_bare_identifier(head_text) && self.commands.contains(head_text) {
                    let mut tokens = Vec::with_capacity(children.len() - 1);
                    for child in &children[1..] {
                        tokens.push(self.eval_leaf_for_param(child, scope, mode).await?);
                    }
                    return self.invoke_command(head_text, tokens, scope, mode).await;
                }
            }
        }

        let mut values = Vec::with_capacity(children.len());
        for child in children {
            values.push(self.eval_leaf_for_param(child, scope, mode).await?);
        }

        if let Some(Value::Fn(f)) = values.first().cloned() {
            let mut call_args = values[1..].to_vec();
            if let Some(receiver) = &f.receiver {
                call_args.insert(0, (**receiver).clone());
            }
            return (f.call)(call_args).await;
        }

        if let Some(Value::Str(name)) = values.first() {
            if self.commands.contains(name) {
                let tokens = values[1..].to_vec();
                return self.invoke_command(name, tokens, scope, mode).await;
            }
        }

        if values.len() > 1 {
            Ok(Value::seq(values))
        } else {
            Ok(values.into_iter().next().unwrap_or(Value::Undefined))
        }
    }

    /// A param child that is itself a leaf string is passed to the command
    /// dispatcher as a raw token (so flag syntax like `-abc` survives); any
    /// other shape (nested operator node) is fully converted first.
    async fn eval_leaf_for_param(
        &self,
        child: &SubCommand,
        scope: &mut Scope,
        mode: Mode,
    ) -> Result<Value, EngineErrorPayload> {
        match child {
            SubCommand::Leaf(text) => converter::convert(text, scope, mode, self).await,
            other => self.eval_tree(other, scope, mode).await,
        }
    }

    async fn invoke_command(
        &self,
        name: &str,
        tokens: Vec<Value>,
        scope: &mut Scope,
        mode: Mode,
    ) -> Result<Value, EngineErrorPayload> {
        let (compiled, call_args) = bind_command(self.commands, name, tokens, scope.clone())?;
        let result = (compiled.spec.callback)(call_args).await?;
        mode.settle(result).await
    }
}

/// The path `setVar`/`>>` assigns through: an evaluated array's elements
/// taken as-is, or a scalar's display string dot-split into segments.
fn assign_path(name_value: &Value) -> Vec<String> {
    match name_value {
        Value::Seq(items) => items.iter().map(Value::to_display_string).collect(),
        other => other.to_display_string().split('.').map(|s| s.to_string()).collect(),
    }
}

/// `isCommandCallable` (spec.md §4.6 step 11) — re-exported for the
/// converter fallback path when a bare name resolves to a registered,
/// zero-argument-invocable command.
pub fn is_command_callable(registry: &CommandRegistry, name: &str) -> bool {
    registry.contains(name)
}
