//! Command Splitter (spec.md §4.5) — `parseCommand`.
//!
//! Recursively splits a normalized string by operator priority into a
//! `SubCommand` tree. Splitting is purely textual: by the time this runs,
//! the normalizer (§4.4) has hidden every quoted literal, signed number and
//! nested brace group behind a `$`/`$$` placeholder, so no operator
//! character inside them can be mistaken for a real operator.

/// A leaf is a bare command-expression string; an internal node is tagged
/// with the operator (by priority index) that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum SubCommand {
    Leaf(String),
    Node { operator: Operator, children: Vec<SubCommand> },
}

/// Operator precedence, lowest-binds-first (spec.md §4.5): the operator
/// nearest the root of the tree is tried first when splitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Sequence,  // ;
    Fail,      // ||
    Success,   // &&
    Nullish,   // ??
    Pipe,      // |
    Assign,    // >>
    Param,     // ' ' (juxtaposition)
}

const OPERATORS: &[(Operator, &str)] = &[
    (Operator::Sequence, ";"),
    (Operator::Fail, "||"),
    (Operator::Success, "&&"),
    (Operator::Nullish, "??"),
    (Operator::Pipe, "|"),
    (Operator::Assign, ">>"),
    (Operator::Param, " "),
];

/// Split `input` into a `SubCommand` tree, starting at operator-index 0.
pub fn parse_command(input: &str) -> SubCommand {
    split_at(input, 0)
}

fn split_at(input: &str, op_index: usize) -> SubCommand {
    if op_index >= OPERATORS.len() {
        return SubCommand::Leaf(input.to_string());
    }
    let (operator, key) = OPERATORS[op_index];
    let pieces = split_on_operator(input, key);
    match pieces {
        Some(parts) if parts.len() > 1 => {
            let children = parts
                .into_iter()
                .filter(|p| !(operator == Operator::Sequence && p.is_empty()))
                .map(|p| split_at(&p, op_index + 1))
                .collect::<Vec<_>>();
            if children.is_empty() {
                SubCommand::Leaf(String::new())
            } else if children.len() == 1 {
                children.into_iter().next().unwrap()
            } else {
                SubCommand::Node { operator, children }
            }
        }
        _ => split_at(input, op_index + 1),
    }
}

/// Splits `input` on every top-level occurrence of `key`, or returns `None`
/// if `key` does not occur at all. "Top-level" matters only for `|`/`||`
/// disambiguation and ` `/multi-char-operator overlap; since every nested
/// bracket/quote/number has already been hidden behind a placeholder by the
/// normalizer, a plain left-to-right scan suffices.
fn split_on_operator(input: &str, key: &str) -> Option<Vec<String>> {
    if key == " " {
        return split_on_space(input);
    }
    if key == "|" {
        return split_on_single_pipe(input);
    }
    if !input.contains(key) {
        return None;
    }
    let parts: Vec<String> = input.split(key).map(|s| s.to_string()).collect();
    Some(parts)
}

/// `|` (context pipe) must not match `||` (fail-operator) occurrences —
/// those were already handled at a lower op-index (spec.md §4.5's
/// precedence list puts `||` nearer the root than `|`, so by the time we
/// reach `|` a bare `||` run would already have been split away; guard
/// anyway for single-leaf inputs that still contain `||`).
fn split_on_single_pipe(input: &str) -> Option<Vec<String>> {
    if !input.contains('|') {
        return None;
    }
    let bytes = input.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;
    let mut found = false;
    while i < bytes.len() {
        if bytes[i] == b'|' {
            if i + 1 < bytes.len() && bytes[i + 1] == b'|' {
                i += 2;
                continue;
            }
            if i > 0 && bytes[i - 1] == b'|' {
                i += 1;
                continue;
            }
            parts.push(input[start..i].to_string());
            start = i + 1;
            found = true;
        }
        i += 1;
    }
    if !found {
        return None;
    }
    parts.push(input[start..].to_string());
    Some(parts)
}

/// Juxtaposition: split on runs of plain spaces (already collapsed to
/// single spaces by the normalizer) that are not part of a placeholder or
/// another operator. Because every other operator is tried at a lower
/// op-index first, a leaf reaching here with embedded spaces is a plain
/// `cmd arg arg` shape.
fn split_on_space(input: &str) -> Option<Vec<String>> {
    if !input.contains(' ') {
        return None;
    }
    let parts: Vec<String> = input.split(' ').filter(|p| !p.is_empty()).map(|s| s.to_string()).collect();
    if parts.len() <= 1 {
        None
    } else {
        Some(parts)
    }
}
