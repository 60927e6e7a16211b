//! Parsed Python sample and the syntax queries layers share.

use tree_sitter::{Node, Parser, Tree};

use crate::validator::layer::LayerFault;

/// Source text plus its tree-sitter parse.
pub struct ParsedSample<'s> {
    source: &'s str,
    tree: Option<Tree>,
}

impl<'s> ParsedSample<'s> {
    pub fn parse(source: &'s str) -> Self {
        let mut parser = Parser::new();
        let tree = match parser.set_language(&tree_sitter_python::LANGUAGE.into()) {
            Ok(()) => parser.parse(source, None),
            Err(e) => {
                tracing::warn!(error = %e, "python grammar unavailable");
                None
            }
        };
        Self { source, tree }
    }

    pub fn source(&self) -> &'s str {
        self.source
    }

    /// 1-based (line, column) of the first ERROR or MISSING node, or
    /// `None` for a clean parse.
    pub fn first_error(&self) -> Option<(usize, usize)> {
        let tree = self.tree.as_ref()?;
        let root = tree.root_node();
        if !root.has_error() {
            return None;
        }
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if node.is_error() || node.is_missing() {
                let pos = node.start_position();
                return Some((pos.row + 1, pos.column + 1));
            }
            if node.has_error() {
                let mut children = child_nodes(node);
                children.reverse();
                stack.extend(children);
            }
        }
        let pos = root.start_position();
        Some((pos.row + 1, pos.column + 1))
    }

    /// The tree, for layers that need a clean parse.
    pub fn syntax(&self) -> Result<Syntax<'_>, LayerFault> {
        let Some(tree) = self.tree.as_ref() else {
            return Err(LayerFault::Unparsable {
                detail: "parser produced no tree".to_string(),
            });
        };
        if let Some((line, column)) = self.first_error() {
            return Err(LayerFault::Unparsable {
                detail: format!("syntax error at line {line}, column {column}"),
            });
        }
        Ok(Syntax {
            root: tree.root_node(),
            source: self.source,
        })
    }
}

// ---------------------------------------------------------------------------
// Syntax queries
// ---------------------------------------------------------------------------

/// A cleanly parsed module.
#[derive(Clone, Copy)]
pub struct Syntax<'t> {
    root: Node<'t>,
    source: &'t str,
}

/// A parameter of a function definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub annotated: bool,
}

impl Param {
    /// `self` / `cls` receivers are not part of a function's interface.
    pub fn is_receiver(&self) -> bool {
        self.name == "self" || self.name == "cls"
    }
}

/// A `def` (sync or async) anywhere in the module.
#[derive(Debug, Clone)]
pub struct FunctionDef<'t> {
    pub node: Node<'t>,
    pub name: String,
    /// Receivers excluded.
    pub params: Vec<Param>,
    pub return_annotated: bool,
}

impl FunctionDef<'_> {
    pub fn annotated_slots(&self) -> usize {
        self.params.iter().filter(|p| p.annotated).count() + usize::from(self.return_annotated)
    }

    /// Every parameter plus the return slot.
    pub fn total_slots(&self) -> usize {
        self.params.len() + 1
    }
}

/// A module referenced by an import statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRef {
    /// Dotted module path; relative imports keep their leading dots.
    pub module: String,
    pub relative: bool,
    pub line: usize,
}

impl ImportRef {
    pub fn top_level(&self) -> &str {
        self.module.split('.').next().unwrap_or(&self.module)
    }
}

impl<'t> Syntax<'t> {
    pub fn root(&self) -> Node<'t> {
        self.root
    }

    pub fn text(&self, node: Node<'_>) -> &'t str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }

    /// Every node in document order.
    pub fn descendants(&self) -> Vec<Node<'t>> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(node) = stack.pop() {
            out.push(node);
            let mut children = child_nodes(node);
            children.reverse();
            stack.extend(children);
        }
        out
    }

    pub fn nodes_of_kind(&self, kinds: &[&str]) -> Vec<Node<'t>> {
        self.descendants()
            .into_iter()
            .filter(|n| kinds.contains(&n.kind()))
            .collect()
    }

    /// All function definitions, outermost first, in document order.
    pub fn functions(&self) -> Vec<FunctionDef<'t>> {
        self.nodes_of_kind(&["function_definition"])
            .into_iter()
            .map(|node| self.function_def(node))
            .collect()
    }

    /// First function definition in document order.
    pub fn primary_function(&self) -> Option<FunctionDef<'t>> {
        self.nodes_of_kind(&["function_definition"])
            .into_iter()
            .next()
            .map(|node| self.function_def(node))
    }

    /// `(name, node)` of every class definition.
    pub fn classes(&self) -> Vec<(String, Node<'t>)> {
        self.nodes_of_kind(&["class_definition"])
            .into_iter()
            .map(|node| (self.field_text(node, "name"), node))
            .collect()
    }

    fn field_text(&self, node: Node<'_>, field: &str) -> String {
        node.child_by_field_name(field)
            .map(|n| self.text(n).to_string())
            .unwrap_or_default()
    }

    fn function_def(&self, node: Node<'t>) -> FunctionDef<'t> {
        let params = node
            .child_by_field_name("parameters")
            .map(|p| {
                named_child_nodes(p)
                    .into_iter()
                    .filter_map(|param| self.param(param))
                    .filter(|param| !param.is_receiver())
                    .collect()
            })
            .unwrap_or_default();
        FunctionDef {
            node,
            name: self.field_text(node, "name"),
            params,
            return_annotated: node.child_by_field_name("return_type").is_some(),
        }
    }

    fn param(&self, node: Node<'_>) -> Option<Param> {
        let (name_node, annotated) = match node.kind() {
            "identifier" => (Some(node), false),
            "typed_parameter" => (named_child_nodes(node).into_iter().next(), true),
            "default_parameter" => (node.child_by_field_name("name"), false),
            "typed_default_parameter" => (node.child_by_field_name("name"), true),
            "list_splat_pattern" | "dictionary_splat_pattern" => (Some(node), false),
            // `*` and `/` separators, comments
            _ => return None,
        };
        let name = self.identifier_in(name_node?)?;
        Some(Param { name, annotated })
    }

    /// The node itself if it is an identifier, else its first identifier
    /// child (`*args` -> `args`).
    fn identifier_in(&self, node: Node<'_>) -> Option<String> {
        if node.kind() == "identifier" {
            return Some(self.text(node).to_string());
        }
        named_child_nodes(node)
            .into_iter()
            .find(|c| c.kind() == "identifier")
            .map(|c| self.text(c).to_string())
    }

    /// Docstring of a function: the leading string expression of its body.
    pub fn docstring(&self, function: Node<'_>) -> Option<String> {
        let body = function.child_by_field_name("body")?;
        let first = named_child_nodes(body)
            .into_iter()
            .find(|n| n.kind() != "comment")?;
        if first.kind() != "expression_statement" {
            return None;
        }
        let string = named_child_nodes(first).into_iter().next()?;
        if string.kind() != "string" {
            return None;
        }
        let content: String = named_child_nodes(string)
            .into_iter()
            .filter(|c| c.kind() == "string_content")
            .map(|c| self.text(c))
            .collect();
        Some(content)
    }

    /// Whether `function` returns a value outside any nested definition.
    pub fn returns_value(&self, function: Node<'_>) -> bool {
        let Some(body) = function.child_by_field_name("body") else {
            return false;
        };
        let mut stack = vec![body];
        while let Some(node) = stack.pop() {
            match node.kind() {
                "function_definition" | "class_definition" | "lambda" => continue,
                "return_statement" if node.named_child_count() > 0 => return true,
                _ => stack.extend(child_nodes(node)),
            }
        }
        false
    }

    /// Every imported module, in document order.
    pub fn imports(&self) -> Vec<ImportRef> {
        let mut out = Vec::new();
        for node in self.nodes_of_kind(&[
            "import_statement",
            "import_from_statement",
            "future_import_statement",
        ]) {
            let line = node.start_position().row + 1;
            match node.kind() {
                "import_statement" => {
                    let mut cursor = node.walk();
                    let names: Vec<Node<'t>> =
                        node.children_by_field_name("name", &mut cursor).collect();
                    for name in names {
                        let dotted = if name.kind() == "aliased_import" {
                            name.child_by_field_name("name")
                        } else {
                            Some(name)
                        };
                        if let Some(dotted) = dotted {
                            out.push(ImportRef {
                                module: self.text(dotted).to_string(),
                                relative: false,
                                line,
                            });
                        }
                    }
                }
                "import_from_statement" => {
                    if let Some(module) = node.child_by_field_name("module_name") {
                        out.push(ImportRef {
                            module: self.text(module).to_string(),
                            relative: module.kind() == "relative_import",
                            line,
                        });
                    }
                }
                _ => out.push(ImportRef {
                    module: "__future__".to_string(),
                    relative: false,
                    line,
                }),
            }
        }
        out
    }

    /// Callee text of every call: `eval`, `pickle.loads`, `obj.method`.
    pub fn call_targets(&self) -> Vec<(String, usize)> {
        self.nodes_of_kind(&["call"])
            .into_iter()
            .filter_map(|call| {
                let callee = call.child_by_field_name("function")?;
                match callee.kind() {
                    "identifier" | "attribute" => Some((
                        self.text(callee).to_string(),
                        callee.start_position().row + 1,
                    )),
                    _ => None,
                }
            })
            .collect()
    }
}

pub(crate) fn child_nodes(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children
}

pub(crate) fn named_child_nodes(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
    children
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"import os, numpy as np
from collections import abc
from . import sibling

class Greeter:
    def greet(self, name: str, *args, times: int = 1, **kw) -> str:
        """Say hello a few times."""
        def inner():
            return 1
        return name * times
"#;

    #[test]
    fn clean_sample_has_no_error() {
        let sample = ParsedSample::parse(SAMPLE);
        assert!(sample.first_error().is_none());
        assert!(sample.syntax().is_ok());
    }

    #[test]
    fn broken_sample_reports_position() {
        let sample = ParsedSample::parse("def f(:\n    return 1\n");
        let (line, _) = sample.first_error().unwrap();
        assert_eq!(line, 1);
        assert!(matches!(sample.syntax(), Err(LayerFault::Unparsable { .. })));
    }

    #[test]
    fn function_parameters_skip_receivers() {
        let sample = ParsedSample::parse(SAMPLE);
        let syntax = sample.syntax().unwrap();
        let f = syntax.primary_function().unwrap();
        assert_eq!(f.name, "greet");
        let names: Vec<&str> = f.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["name", "args", "times", "kw"]);
        assert_eq!(f.annotated_slots(), 3);
        assert_eq!(f.total_slots(), 5);
        assert_eq!(syntax.functions().len(), 2);
        assert_eq!(syntax.classes()[0].0, "Greeter");
    }

    #[test]
    fn docstring_and_return_path() {
        let sample = ParsedSample::parse(SAMPLE);
        let syntax = sample.syntax().unwrap();
        let f = syntax.primary_function().unwrap();
        assert_eq!(syntax.docstring(f.node).as_deref(), Some("Say hello a few times."));
        assert!(syntax.returns_value(f.node));

        let bare = ParsedSample::parse("def f(x):\n    def g():\n        return 1\n    return\n");
        let syntax = bare.syntax().unwrap();
        let f = syntax.primary_function().unwrap();
        assert!(!syntax.returns_value(f.node));
        assert!(syntax.docstring(f.node).is_none());
    }

    #[test]
    fn imports_are_enumerated() {
        let sample = ParsedSample::parse(SAMPLE);
        let imports = sample.syntax().unwrap().imports();
        let modules: Vec<&str> = imports.iter().map(|i| i.module.as_str()).collect();
        assert_eq!(modules, vec!["os", "numpy", "collections", "."]);
        assert!(imports[3].relative);
        assert_eq!(imports[2].line, 2);
    }

    #[test]
    fn call_targets_keep_attribute_paths() {
        let sample = ParsedSample::parse("import pickle\nx = pickle.loads(b'')\neval('1')\n");
        let calls: Vec<String> = sample
            .syntax()
            .unwrap()
            .call_targets()
            .into_iter()
            .map(|(c, _)| c)
            .collect();
        assert_eq!(calls, vec!["pickle.loads", "eval"]);
    }
}
