//! Type and logic layers (13-17).

use regex::Regex;
use tree_sitter::Node;

use crate::validator::layer::{LayerCheckResult, LayerFault, LayerInput, LayerOutcome};
use crate::validator::sample::{child_nodes, named_child_nodes};

/// Minimum annotated / total slots across every function for L13.
pub const TYPE_HINT_THRESHOLD: f64 = 0.7;

/// Deepest allowed nesting of compound statements for L17.
pub const MAX_NESTING_DEPTH: usize = 3;

const CONTROL_KINDS: &[&str] = &[
    "if_statement",
    "for_statement",
    "while_statement",
    "try_statement",
    "match_statement",
    "conditional_expression",
];

const NESTING_KINDS: &[&str] = &[
    "if_statement",
    "for_statement",
    "while_statement",
    "try_statement",
    "with_statement",
    "match_statement",
];

const DENIED_CALLS: &[&str] = &[
    "eval",
    "exec",
    "compile",
    "__import__",
    "pickle.load",
    "pickle.loads",
    "marshal.load",
    "marshal.loads",
    "yaml.unsafe_load",
];

const SECRET_PATTERNS: &[&str] = &[
    r#"(?i)\b\w*(api_key|secret_key|access_token)\s*=\s*['"][^'"\s]{10,}['"]"#,
    r#"(?i)\b\w*password\s*=\s*['"][^'"\s]{8,}['"]"#,
];

/// L13: annotation coverage over every function in the sample.
pub fn type_hints(input: &LayerInput<'_>) -> LayerCheckResult {
    let functions = input.sample.syntax()?.functions();
    if functions.is_empty() {
        return Ok(LayerOutcome::pass("no functions to check"));
    }
    let annotated: usize = functions.iter().map(|f| f.annotated_slots()).sum();
    let total: usize = functions.iter().map(|f| f.total_slots()).sum();
    let coverage = annotated as f64 / total as f64;
    Ok(LayerOutcome::verdict(
        coverage >= TYPE_HINT_THRESHOLD,
        format!(
            "type hints cover {annotated}/{total} slots across {} function(s)",
            functions.len()
        ),
    ))
}

/// L14: a leaf with constraints needs some control flow to honor them.
pub fn control_structures(input: &LayerInput<'_>) -> LayerCheckResult {
    let found = input.sample.syntax()?.nodes_of_kind(CONTROL_KINDS).len();
    let constrained = !input.spec.constraints.is_empty();
    match (found, constrained) {
        (0, true) => Ok(LayerOutcome::fail(format!(
            "{} constraint(s) declared but no conditional, loop, match or try found",
            input.spec.constraints.len()
        ))),
        (0, false) => Ok(LayerOutcome::pass("straight-line logic")),
        (n, _) => Ok(LayerOutcome::pass(format!("{n} control structure(s)"))),
    }
}

/// L15: errors are handled, and handlers do something.
pub fn error_handling(input: &LayerInput<'_>) -> LayerCheckResult {
    let syntax = input.sample.syntax()?;
    let tries = syntax.nodes_of_kind(&["try_statement"]);
    if tries.is_empty() {
        return Ok(LayerOutcome::fail("no error handling: add a try/except block"));
    }

    let mut silent = Vec::new();
    for handler in syntax.nodes_of_kind(&["except_clause", "except_group_clause"]) {
        let body = named_child_nodes(handler)
            .into_iter()
            .find(|c| c.kind() == "block");
        if body.map_or(true, is_noop_block) {
            silent.push(handler.start_position().row + 1);
        }
    }

    if silent.is_empty() {
        return Ok(LayerOutcome::pass(format!(
            "{} try block(s) with active handlers",
            tries.len()
        )));
    }
    let lines: Vec<String> = silent.iter().map(ToString::to_string).collect();
    Ok(LayerOutcome::fail(format!(
        "anti-pattern: {} handler(s) swallow errors with an empty body (line {})",
        silent.len(),
        lines.join(", ")
    )))
}

/// Only `pass`, `...` or comments.
fn is_noop_block(block: Node<'_>) -> bool {
    named_child_nodes(block).into_iter().all(|stmt| match stmt.kind() {
        "pass_statement" | "comment" => true,
        "expression_statement" => named_child_nodes(stmt)
            .into_iter()
            .all(|e| e.kind() == "ellipsis"),
        _ => false,
    })
}

/// L16: dangerous calls and hard-coded secrets.
pub fn security(input: &LayerInput<'_>) -> LayerCheckResult {
    let syntax = input.sample.syntax()?;
    let mut issues: Vec<String> = syntax
        .call_targets()
        .into_iter()
        .filter(|(callee, _)| DENIED_CALLS.contains(&callee.as_str()))
        .map(|(callee, line)| format!("dangerous call {callee}() at line {line}"))
        .collect();

    for pattern in SECRET_PATTERNS {
        let re = Regex::new(pattern).map_err(|e| LayerFault::Internal(e.to_string()))?;
        for found in re.find_iter(input.sample.source()) {
            let line = input.sample.source()[..found.start()].matches('\n').count() + 1;
            issues.push(format!("hard-coded secret at line {line}"));
        }
    }

    if issues.is_empty() {
        Ok(LayerOutcome::pass("no security issues found"))
    } else {
        Ok(LayerOutcome::fail(format!(
            "{} security issue(s): {}",
            issues.len(),
            issues.join("; ")
        )))
    }
}

/// L17: maximum nesting of compound statements, by depth-first traversal
/// with an explicit stack of (node, enclosing depth).
pub fn nesting_depth(input: &LayerInput<'_>) -> LayerCheckResult {
    let syntax = input.sample.syntax()?;
    let depth = max_nesting_depth(syntax.root());
    Ok(LayerOutcome::verdict(
        depth <= MAX_NESTING_DEPTH,
        if depth <= MAX_NESTING_DEPTH {
            format!("max nesting depth {depth}")
        } else {
            format!("nesting depth {depth} exceeds {MAX_NESTING_DEPTH}; flatten the logic")
        },
    ))
}

pub fn max_nesting_depth(root: Node<'_>) -> usize {
    let mut max = 0;
    let mut stack = vec![(root, 0usize)];
    while let Some((node, depth)) = stack.pop() {
        let depth = if NESTING_KINDS.contains(&node.kind()) {
            depth + 1
        } else {
            depth
        };
        max = max.max(depth);
        stack.extend(child_nodes(node).into_iter().map(|c| (c, depth)));
    }
    max
}
