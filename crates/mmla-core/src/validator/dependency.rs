//! Dependency layers (9-12): what the sample imports and whether it may.

use crate::validator::layer::{LayerCheckResult, LayerInput, LayerOutcome};
use crate::validator::sample::ImportRef;
use crate::validator::stdlib::is_stdlib;
use mmla_state::LeafSpec;

/// Where an imported module comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportClass {
    Standard,
    Declared,
    Undeclared,
    Relative,
}

pub fn classify(import: &ImportRef, spec: &LeafSpec) -> ImportClass {
    if import.relative {
        ImportClass::Relative
    } else if is_stdlib(&import.module) {
        ImportClass::Standard
    } else if spec
        .allowed_imports
        .iter()
        .any(|a| a == &import.module || a == import.top_level())
    {
        ImportClass::Declared
    } else {
        ImportClass::Undeclared
    }
}

/// L9: enumerate imported modules.
pub fn imports(input: &LayerInput<'_>) -> LayerCheckResult {
    let imports = input.sample.syntax()?.imports();
    if imports.is_empty() {
        return Ok(LayerOutcome::pass("no imports"));
    }
    let modules: Vec<&str> = imports.iter().map(|i| i.module.as_str()).collect();
    Ok(LayerOutcome::pass(format!(
        "{} import(s): {}",
        modules.len(),
        modules.join(", ")
    )))
}

/// L10: classify every import. Informational.
pub fn classification(input: &LayerInput<'_>) -> LayerCheckResult {
    let imports = input.sample.syntax()?.imports();
    if imports.is_empty() {
        return Ok(LayerOutcome::pass("none"));
    }

    let group = |class: ImportClass| -> Vec<&str> {
        imports
            .iter()
            .filter(|i| classify(i, input.spec) == class)
            .map(|i| i.module.as_str())
            .collect()
    };
    let mut parts = Vec::new();
    for (label, class) in [
        ("standard", ImportClass::Standard),
        ("declared", ImportClass::Declared),
        ("undeclared", ImportClass::Undeclared),
        ("relative", ImportClass::Relative),
    ] {
        let modules = group(class);
        if !modules.is_empty() {
            parts.push(format!("{label}: {}", modules.join(", ")));
        }
    }
    Ok(LayerOutcome::pass(parts.join("; ")))
}

/// L11: every third-party module is on the leaf's allow-list.
pub fn allow_list(input: &LayerInput<'_>) -> LayerCheckResult {
    let imports = input.sample.syntax()?.imports();
    let mut undeclared: Vec<&str> = imports
        .iter()
        .filter(|i| classify(i, input.spec) == ImportClass::Undeclared)
        .map(|i| i.module.as_str())
        .collect();
    undeclared.dedup();

    if undeclared.is_empty() {
        Ok(LayerOutcome::pass("all imports are standard or declared"))
    } else {
        Ok(LayerOutcome::fail(format!(
            "imports not in the allow-list: {}",
            undeclared.join(", ")
        )))
    }
}

/// L12: relative imports are a circular-dependency risk.
pub fn circular_risk(input: &LayerInput<'_>) -> LayerCheckResult {
    let imports = input.sample.syntax()?.imports();
    let relative: Vec<String> = imports
        .iter()
        .filter(|i| i.relative)
        .map(|i| format!("'{}' (line {})", i.module, i.line))
        .collect();

    if relative.is_empty() {
        Ok(LayerOutcome::pass("no relative imports"))
    } else {
        Ok(LayerOutcome::fail(format!(
            "relative import risks a circular dependency: {}",
            relative.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::sample::ParsedSample;

    const CODE: &str = "import os\nimport numpy as np\nimport requests\nfrom .models import User\n";

    fn spec() -> LeafSpec {
        LeafSpec {
            allowed_imports: vec!["numpy".into()],
            ..LeafSpec::default()
        }
    }

    fn check(f: fn(&LayerInput<'_>) -> LayerCheckResult, code: &str) -> LayerOutcome {
        let sample = ParsedSample::parse(code);
        let spec = spec();
        f(&LayerInput {
            sample: &sample,
            spec: &spec,
        })
        .unwrap()
    }

    #[test]
    fn enumeration_and_classification() {
        let listed = check(imports, CODE);
        assert!(listed.passed);
        assert!(listed.message.starts_with("4 import(s)"));

        let classes = check(classification, CODE);
        assert!(classes.passed);
        assert_eq!(
            classes.message,
            "standard: os; declared: numpy; undeclared: requests; relative: .models"
        );
        assert_eq!(check(classification, "x = 1\n").message, "none");
    }

    #[test]
    fn allow_list_flags_undeclared_third_party() {
        let out = check(allow_list, CODE);
        assert!(!out.passed);
        assert_eq!(out.message, "imports not in the allow-list: requests");
        assert!(check(allow_list, "import os.path\nfrom numpy.linalg import inv\n").passed);
    }

    #[test]
    fn relative_imports_fail_circular_check() {
        let out = check(circular_risk, CODE);
        assert!(!out.passed);
        assert!(out.message.contains(".models"));
        assert!(check(circular_risk, "import os\n").passed);
    }
}
