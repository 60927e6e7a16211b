//! Signature layers (5-8), all about the primary function: the first
//! `def` in document order.

use std::collections::BTreeSet;

use crate::validator::layer::{LayerCheckResult, LayerInput, LayerOutcome};

/// Minimum (annotated params + return) / (params + 1) for L7.
pub const ANNOTATION_THRESHOLD: f64 = 0.8;

/// Docstrings must be longer than this (characters, trimmed).
pub const MIN_DOCSTRING_CHARS: usize = 10;

const NO_FUNCTION: &str = "no function definition found";

/// L5: parameter names equal the declared input names.
pub fn parameters(input: &LayerInput<'_>) -> LayerCheckResult {
    let syntax = input.sample.syntax()?;
    let Some(function) = syntax.primary_function() else {
        return Ok(LayerOutcome::fail(NO_FUNCTION));
    };

    let expected: BTreeSet<&str> = input.spec.input_names().collect();
    let actual: BTreeSet<&str> = function.params.iter().map(|p| p.name.as_str()).collect();
    if expected == actual {
        return Ok(LayerOutcome::pass(format!(
            "parameters of '{}' match the declared inputs",
            function.name
        )));
    }

    let missing: Vec<&str> = expected.difference(&actual).copied().collect();
    let extra: Vec<&str> = actual.difference(&expected).copied().collect();
    let mut parts = Vec::new();
    if !missing.is_empty() {
        parts.push(format!("missing {}", missing.join(", ")));
    }
    if !extra.is_empty() {
        parts.push(format!("unexpected {}", extra.join(", ")));
    }
    Ok(LayerOutcome::fail(format!(
        "parameters of '{}' do not match the declared inputs: {}",
        function.name,
        parts.join("; ")
    )))
}

/// L6: a value is returned when the leaf declares an output.
pub fn return_path(input: &LayerInput<'_>) -> LayerCheckResult {
    if !input.spec.outputs.is_declared() {
        return Ok(LayerOutcome::pass("no output declared"));
    }
    let syntax = input.sample.syntax()?;
    let Some(function) = syntax.primary_function() else {
        return Ok(LayerOutcome::fail(NO_FUNCTION));
    };
    if syntax.returns_value(function.node) {
        Ok(LayerOutcome::pass(format!("'{}' returns a value", function.name)))
    } else {
        Ok(LayerOutcome::fail(format!(
            "'{}' declares an output but never returns a value",
            function.name
        )))
    }
}

/// L7: annotation coverage of the primary function's signature.
pub fn annotations(input: &LayerInput<'_>) -> LayerCheckResult {
    let syntax = input.sample.syntax()?;
    let Some(function) = syntax.primary_function() else {
        return Ok(LayerOutcome::fail(NO_FUNCTION));
    };

    let coverage = function.annotated_slots() as f64 / function.total_slots() as f64;
    let percent = (coverage * 100.0).round();
    if coverage >= ANNOTATION_THRESHOLD {
        Ok(LayerOutcome::pass(format!("annotation coverage {percent}%")))
    } else {
        Ok(LayerOutcome::fail(format!(
            "annotation coverage {percent}% is below {}%",
            ANNOTATION_THRESHOLD * 100.0
        )))
    }
}

/// L8: the primary function carries a meaningful docstring.
pub fn docstring(input: &LayerInput<'_>) -> LayerCheckResult {
    let syntax = input.sample.syntax()?;
    let Some(function) = syntax.primary_function() else {
        return Ok(LayerOutcome::fail(NO_FUNCTION));
    };

    match syntax.docstring(function.node) {
        Some(doc) if doc.trim().chars().count() > MIN_DOCSTRING_CHARS => Ok(LayerOutcome::pass(
            format!("docstring present ({} chars)", doc.trim().chars().count()),
        )),
        Some(_) => Ok(LayerOutcome::fail(format!(
            "docstring of '{}' is too short",
            function.name
        ))),
        None => Ok(LayerOutcome::fail(format!(
            "'{}' has no docstring",
            function.name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::sample::ParsedSample;
    use mmla_state::{FieldSpec, LeafSpec, OutputSpec};

    fn spec(inputs: &[&str], output: bool) -> LeafSpec {
        LeafSpec {
            inputs: inputs.iter().map(|n| FieldSpec::new(*n, "str")).collect(),
            outputs: if output {
                OutputSpec::Single { ty: "str".into() }
            } else {
                OutputSpec::default()
            },
            ..LeafSpec::default()
        }
    }

    fn check(
        f: fn(&LayerInput<'_>) -> LayerCheckResult,
        code: &str,
        spec: &LeafSpec,
    ) -> LayerOutcome {
        let sample = ParsedSample::parse(code);
        f(&LayerInput {
            sample: &sample,
            spec,
        })
        .unwrap()
    }

    #[test]
    fn parameter_sets_must_match_exactly() {
        let s = spec(&["user", "password"], false);
        assert!(check(parameters, "def login(password, user):\n    pass\n", &s).passed);

        let missing = check(parameters, "def login(user):\n    pass\n", &s);
        assert!(!missing.passed);
        assert!(missing.message.contains("missing password"));

        let extra = check(parameters, "def login(user, password, otp):\n    pass\n", &s);
        assert!(extra.message.contains("unexpected otp"));

        let method = "class A:\n    def login(self, user, password):\n        pass\n";
        assert!(check(parameters, method, &s).passed);
    }

    #[test]
    fn return_needed_only_with_declared_output() {
        let code = "def f(x):\n    print(x)\n";
        assert!(check(return_path, code, &spec(&["x"], false)).passed);
        assert!(!check(return_path, code, &spec(&["x"], true)).passed);
        assert!(check(return_path, "def f(x):\n    return x\n", &spec(&["x"], true)).passed);
    }

    #[test]
    fn annotation_coverage_threshold() {
        let s = spec(&[], false);
        // 3 of 3 slots
        assert!(check(annotations, "def f(a: int, b: int) -> int:\n    return a\n", &s).passed);
        // 4 of 5 slots = 80%
        assert!(
            check(annotations, "def f(a: int, b: int, c: int, d) -> int:\n    return a\n", &s)
                .passed
        );
        // 2 of 3 slots
        let low = check(annotations, "def f(a: int, b) -> int:\n    return a\n", &s);
        assert!(!low.passed);
        assert!(low.message.contains("67%"));
    }

    #[test]
    fn docstring_length() {
        let s = spec(&[], false);
        let long = "def f():\n    \"\"\"Compute the thing.\"\"\"\n    return 1\n";
        assert!(check(docstring, long, &s).passed);
        let short = "def f():\n    \"\"\"Short.\"\"\"\n    return 1\n";
        assert!(check(docstring, short, &s).message.contains("too short"));
        let none = "def f():\n    return 1\n";
        assert!(check(docstring, none, &s).message.contains("no docstring"));
    }

    #[test]
    fn missing_function_fails_signature_layers() {
        let s = spec(&[], true);
        for layer in [parameters, return_path, annotations, docstring] {
            let out = check(layer, "class A:\n    pass\n", &s);
            assert!(!out.passed);
            assert_eq!(out.message, NO_FUNCTION);
        }
    }
}
