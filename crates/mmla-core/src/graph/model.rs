//! Compiler input (editor graph) and compiled node types.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mmla_state::{LeafSpec, NodeState};

// ---------------------------------------------------------------------------
// Input graph
// ---------------------------------------------------------------------------

/// Kind tag of an input node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Root,
    Branch,
    Leaf,
}

impl NodeType {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Root => "ROOT",
            NodeType::Branch => "BRANCH",
            NodeType::Leaf => "LEAF",
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific payload of an input node. Fields that do not apply to the
/// node's kind are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub status: Option<NodeState>,
    #[serde(default)]
    pub spec: Option<LeafSpec>,
    #[serde(default)]
    pub meta: serde_json::Value,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// One node as drawn in the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeType,
    #[serde(default, alias = "parentNode", skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default)]
    pub data: NodeData,
}

impl NodeDescriptor {
    pub fn new(id: impl Into<String>, kind: NodeType) -> Self {
        Self {
            id: id.into(),
            kind,
            parent: None,
            data: NodeData::default(),
        }
    }

    pub fn root(id: impl Into<String>) -> Self {
        Self::new(id, NodeType::Root)
    }

    pub fn branch(id: impl Into<String>, parent: impl Into<String>) -> Self {
        Self::new(id, NodeType::Branch).with_parent(parent)
    }

    pub fn leaf(id: impl Into<String>, parent: impl Into<String>, spec: LeafSpec) -> Self {
        let mut node = Self::new(id, NodeType::Leaf).with_parent(parent);
        node.data.spec = Some(spec);
        node
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.data.name = Some(name.into());
        self
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.data.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_status(mut self, status: NodeState) -> Self {
        self.data.status = Some(status);
        self
    }

    /// Dependencies apply to branches and leaves only.
    pub fn declared_dependencies(&self) -> &[String] {
        match self.kind {
            NodeType::Root => &[],
            NodeType::Branch | NodeType::Leaf => &self.data.dependencies,
        }
    }
}

/// Which output field of the source feeds which input field of the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub source_field: String,
    pub target_field: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeData {
    #[serde(default)]
    pub mapping: Option<FieldMapping>,
}

/// A typed link between two nodes, used only during compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDescriptor {
    pub id: String,
    #[serde(alias = "source")]
    pub source_node_id: String,
    #[serde(alias = "target")]
    pub target_node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<FieldMapping>,
    /// Editor exports nest the mapping under `data`.
    #[serde(default, skip_serializing)]
    pub data: EdgeData,
}

impl EdgeDescriptor {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_node_id: source.into(),
            target_node_id: target.into(),
            mapping: None,
            data: EdgeData::default(),
        }
    }

    pub fn with_mapping(
        mut self,
        source_field: impl Into<String>,
        target_field: impl Into<String>,
    ) -> Self {
        self.mapping = Some(FieldMapping {
            source_field: source_field.into(),
            target_field: target_field.into(),
        });
        self
    }

    pub fn field_mapping(&self) -> Option<&FieldMapping> {
        self.mapping.as_ref().or(self.data.mapping.as_ref())
    }
}

/// A whole editor export: `{ "nodes": [...], "edges": [...] }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawGraph {
    #[serde(default)]
    pub nodes: Vec<NodeDescriptor>,
    #[serde(default)]
    pub edges: Vec<EdgeDescriptor>,
}

impl RawGraph {
    pub fn from_json_str(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading graph {}", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("parsing graph {}", path.display()))
    }
}

// ---------------------------------------------------------------------------
// Compiled nodes
// ---------------------------------------------------------------------------

/// Kind-specific payload of a compiled node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Root {
        meta: serde_json::Value,
        config: serde_json::Value,
        children: Vec<String>,
    },
    Branch {
        description: Option<String>,
        dependencies: Vec<String>,
        children: Vec<String>,
    },
    Leaf {
        dependencies: Vec<String>,
        spec: LeafSpec,
    },
}

/// A work item in a compiled tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub status: NodeState,
    pub last_updated: Option<DateTime<Utc>>,
    pub kind: NodeKind,
}

impl Node {
    pub fn node_type(&self) -> NodeType {
        match self.kind {
            NodeKind::Root { .. } => NodeType::Root,
            NodeKind::Branch { .. } => NodeType::Branch,
            NodeKind::Leaf { .. } => NodeType::Leaf,
        }
    }

    pub fn dependencies(&self) -> &[String] {
        match &self.kind {
            NodeKind::Root { .. } => &[],
            NodeKind::Branch { dependencies, .. } | NodeKind::Leaf { dependencies, .. } => {
                dependencies
            }
        }
    }

    pub fn children(&self) -> &[String] {
        match &self.kind {
            NodeKind::Root { children, .. } | NodeKind::Branch { children, .. } => children,
            NodeKind::Leaf { .. } => &[],
        }
    }

    pub fn spec(&self) -> Option<&LeafSpec> {
        match &self.kind {
            NodeKind::Leaf { spec, .. } => Some(spec),
            _ => None,
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut Vec<String>> {
        match &mut self.kind {
            NodeKind::Root { children, .. } | NodeKind::Branch { children, .. } => Some(children),
            NodeKind::Leaf { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn editor_export_aliases_are_accepted() {
        let raw = r#"{
            "nodes": [
                {"id": "root", "type": "ROOT", "data": {"meta": {"project_name": "shop"}}},
                {"id": "auth", "type": "BRANCH", "parentNode": "root", "data": {"name": "Auth"}}
            ],
            "edges": [
                {"id": "e1", "source": "a", "target": "b",
                 "data": {"mapping": {"source_field": "x", "target_field": "y"}}}
            ]
        }"#;
        let graph = RawGraph::from_json_str(raw).unwrap();
        assert_eq!(graph.nodes[1].parent.as_deref(), Some("root"));
        assert_eq!(graph.edges[0].source_node_id, "a");
        assert_eq!(
            graph.edges[0].field_mapping().map(|m| m.target_field.as_str()),
            Some("y")
        );
    }

    #[test]
    fn root_ignores_declared_dependencies() {
        let root = NodeDescriptor::root("r").with_dependencies(["x"]);
        assert!(root.declared_dependencies().is_empty());
    }
}
