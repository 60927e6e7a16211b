//! Error types for graph compilation.

use serde::Serialize;
use thiserror::Error;

/// A mapped edge whose endpoint field types disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeMismatch {
    pub edge_id: String,
    pub source_node_id: String,
    pub source_field: String,
    pub source_type: String,
    pub target_node_id: String,
    pub target_field: String,
    pub target_type: String,
}

impl std::fmt::Display for TypeMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "edge {}: {}.{}({}) -> {}.{}({})",
            self.edge_id,
            self.source_node_id,
            self.source_field,
            self.source_type,
            self.target_node_id,
            self.target_field,
            self.target_type
        )
    }
}

/// Why a graph could not be compiled. No tree is produced on any of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("duplicate node id: {id}")]
    DuplicateNode { id: String },

    #[error("node {node} depends on unknown node {dependency}")]
    UnknownDependency { node: String, dependency: String },

    #[error("node {node} lists itself as a dependency")]
    SelfDependency { node: String },

    #[error("cycle detected among nodes: {nodes:?}")]
    CycleDetected { nodes: Vec<String> },

    #[error("{} type mismatch(es): {}", .0.len(), join_mismatches(.0))]
    TypeMismatch(Vec<TypeMismatch>),

    #[error("no ROOT node found")]
    NoRoot,

    #[error("multiple ROOT nodes found: {roots:?}")]
    MultipleRoots { roots: Vec<String> },

    #[error("node {node} names unknown parent {parent}")]
    UnknownParent { node: String, parent: String },

    #[error("node {node} cannot be placed under {parent}: {reason}")]
    InvalidParent {
        node: String,
        parent: String,
        reason: String,
    },

    #[error("node {node} is not reachable from the root")]
    OrphanNode { node: String },
}

fn join_mismatches(mismatches: &[TypeMismatch]) -> String {
    mismatches
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Convenience result alias.
pub type CompileResult<T> = std::result::Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_mismatch_error_lists_every_edge() {
        let m = |edge: &str| TypeMismatch {
            edge_id: edge.to_string(),
            source_node_id: "a".to_string(),
            source_field: "total".to_string(),
            source_type: "int".to_string(),
            target_node_id: "b".to_string(),
            target_field: "label".to_string(),
            target_type: "str".to_string(),
        };
        let msg = CompileError::TypeMismatch(vec![m("e1"), m("e2")]).to_string();
        assert!(msg.starts_with("2 type mismatch"));
        assert!(msg.contains("edge e1: a.total(int) -> b.label(str)"));
        assert!(msg.contains("edge e2"));
    }

    #[test]
    fn cycle_error_names_nodes() {
        let err = CompileError::CycleDetected {
            nodes: vec!["x".into(), "y".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("\"x\""));
        assert!(msg.contains("\"y\""));
    }
}
