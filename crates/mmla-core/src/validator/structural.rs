//! Structural layers (1-4): syntax, definitions, indentation, naming.

use regex::Regex;

use crate::validator::layer::{LayerCheckResult, LayerFault, LayerInput, LayerOutcome};

const MAX_LISTED_ISSUES: usize = 3;

/// L1: the sample parses without ERROR or MISSING nodes.
pub fn syntax(input: &LayerInput<'_>) -> LayerCheckResult {
    match input.sample.first_error() {
        None => {
            input.sample.syntax()?;
            Ok(LayerOutcome::pass("syntax is valid"))
        }
        Some((line, column)) => Ok(LayerOutcome::fail(format!(
            "syntax error at line {line}, column {column}"
        ))),
    }
}

/// L2: at least one function or class definition.
pub fn definitions(input: &LayerInput<'_>) -> LayerCheckResult {
    let syntax = input.sample.syntax()?;
    let functions = syntax.functions().len();
    let classes = syntax.classes().len();
    if functions + classes == 0 {
        return Ok(LayerOutcome::fail("no function or class definition found"));
    }
    Ok(LayerOutcome::pass(format!(
        "{functions} function(s), {classes} class(es) defined"
    )))
}

/// L3: spaces only, in multiples of four. Text based so it also runs on
/// samples that do not parse.
pub fn indentation(input: &LayerInput<'_>) -> LayerCheckResult {
    let mut issues = Vec::new();
    for (i, line) in input.sample.source().lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let indent: &str = &line[..line.len() - line.trim_start().len()];
        if indent.contains('\t') {
            issues.push(format!("line {}: tab in indentation", i + 1));
        } else if indent.len() % 4 != 0 {
            issues.push(format!(
                "line {}: indentation of {} is not a multiple of 4",
                i + 1,
                indent.len()
            ));
        }
    }

    if issues.is_empty() {
        return Ok(LayerOutcome::pass("indentation is consistent"));
    }
    let total = issues.len();
    issues.truncate(MAX_LISTED_ISSUES);
    Ok(LayerOutcome::fail(format!(
        "{total} indentation issue(s): {}",
        issues.join("; ")
    )))
}

/// L4: functions in snake_case, classes in PascalCase.
pub fn naming(input: &LayerInput<'_>) -> LayerCheckResult {
    let syntax = input.sample.syntax()?;
    let snake = Regex::new(r"^[a-z_][a-z0-9_]*$").map_err(|e| LayerFault::Internal(e.to_string()))?;
    let pascal = Regex::new(r"^[A-Z][a-zA-Z0-9]*$").map_err(|e| LayerFault::Internal(e.to_string()))?;

    let mut issues: Vec<String> = syntax
        .functions()
        .into_iter()
        .filter(|f| !snake.is_match(&f.name))
        .map(|f| format!("function '{}' is not snake_case", f.name))
        .collect();
    issues.extend(
        syntax
            .classes()
            .into_iter()
            .filter(|(name, _)| !pascal.is_match(name))
            .map(|(name, _)| format!("class '{name}' is not PascalCase")),
    );

    if issues.is_empty() {
        return Ok(LayerOutcome::pass("names follow PEP 8"));
    }
    let total = issues.len();
    issues.truncate(MAX_LISTED_ISSUES);
    Ok(LayerOutcome::fail(format!(
        "{total} naming issue(s): {}",
        issues.join("; ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::sample::ParsedSample;
    use mmla_state::LeafSpec;

    fn check(f: fn(&LayerInput<'_>) -> LayerCheckResult, code: &str) -> LayerCheckResult {
        let sample = ParsedSample::parse(code);
        let spec = LeafSpec::default();
        f(&LayerInput {
            sample: &sample,
            spec: &spec,
        })
    }

    #[test]
    fn syntax_layer_reports_location() {
        let ok = check(syntax, "def f():\n    return 1\n").unwrap();
        assert!(ok.passed);
        let bad = check(syntax, "def f(:\n    return 1\n").unwrap();
        assert!(!bad.passed);
        assert!(bad.message.starts_with("syntax error at line 1"));
    }

    #[test]
    fn definitions_required() {
        assert!(!check(definitions, "x = 1\n").unwrap().passed);
        assert!(check(definitions, "class A:\n    pass\n").unwrap().passed);
        assert!(check(definitions, "def f(:\n").is_err());
    }

    #[test]
    fn indentation_rejects_tabs_and_odd_widths() {
        assert!(check(indentation, "def f():\n    return 1\n\n").unwrap().passed);
        let tabs = check(indentation, "def f():\n\treturn 1\n").unwrap();
        assert!(!tabs.passed);
        assert!(tabs.message.contains("tab"));
        let odd = check(indentation, "def f():\n  return 1\n").unwrap();
        assert!(odd.message.contains("not a multiple of 4"));
        // text based: still runs on broken input
        assert!(check(indentation, "def f(:\n    x\n").unwrap().passed);
    }

    #[test]
    fn naming_conventions() {
        assert!(check(naming, "class UserStore:\n    def __init__(self):\n        pass\n")
            .unwrap()
            .passed);
        let bad = check(naming, "def getUser():\n    pass\nclass user_store:\n    pass\n").unwrap();
        assert!(!bad.passed);
        assert!(bad.message.starts_with("2 naming issue(s)"));
        assert!(bad.message.contains("getUser"));
        assert!(bad.message.contains("user_store"));
    }
}
