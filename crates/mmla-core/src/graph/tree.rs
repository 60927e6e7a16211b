//! The compiled specification tree.
//!
//! Nodes live in a flat arena keyed by id; a parent index answers upward
//! queries without walking the hierarchy. The tree converts losslessly to
//! and from the persisted [`SpecDocument`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use mmla_state::{BranchRecord, LeafRecord, ModuleRecord, NodeState, SpecDocument};

use crate::graph::compiler::{check_dependencies, index_ids, topological_order};
use crate::graph::error::{CompileError, CompileResult};
use crate::graph::model::{Node, NodeKind};

#[derive(Debug, Clone, PartialEq)]
pub struct SpecTree {
    root_id: String,
    nodes: HashMap<String, Node>,
    parents: HashMap<String, String>,
    order: Vec<String>,
    revision: u64,
}

impl SpecTree {
    pub(crate) fn from_parts(
        root_id: String,
        nodes: HashMap<String, Node>,
        parents: HashMap<String, String>,
        order: Vec<String>,
    ) -> Self {
        Self {
            root_id,
            nodes,
            parents,
            order,
            revision: 0,
        }
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    pub fn root(&self) -> Option<&Node> {
        self.nodes.get(&self.root_id)
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn parent_of(&self, id: &str) -> Option<&Node> {
        self.parents.get(id).and_then(|p| self.nodes.get(p))
    }

    /// Dependency-respecting order computed when the tree was built.
    pub fn topological_order(&self) -> &[String] {
        &self.order
    }

    /// Store revision this tree was read at (0 for a fresh compile).
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in topological order.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn status_of(&self, id: &str) -> Option<NodeState> {
        self.nodes.get(id).map(|n| n.status)
    }

    /// Set a node's status and stamp it. Returns `false` for unknown ids.
    pub(crate) fn set_status(&mut self, id: &str, status: NodeState, at: DateTime<Utc>) -> bool {
        match self.nodes.get_mut(id) {
            Some(node) => {
                node.status = status;
                node.last_updated = Some(at);
                true
            }
            None => false,
        }
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    /// High-level outline of the project.
    pub fn summary(&self) -> TreeSummary {
        let meta = self.root_meta();
        let text = |key: &str| {
            meta.and_then(|m| m.get(key))
                .and_then(serde_json::Value::as_str)
                .unwrap_or("Unknown")
                .to_string()
        };
        TreeSummary {
            project_name: text("project_name"),
            version: text("version"),
            root_id: self.root_id.clone(),
            modules: self
                .root()
                .map(|r| r.children().iter().filter_map(|c| self.outline(c)).collect())
                .unwrap_or_default(),
        }
    }

    fn outline(&self, id: &str) -> Option<OutlineEntry> {
        let node = self.nodes.get(id)?;
        Some(OutlineEntry {
            kind: node.node_type().as_str().to_string(),
            id: node.id.clone(),
            name: node.name.clone(),
            status: node.status,
            children: node
                .children()
                .iter()
                .filter_map(|c| self.outline(c))
                .collect(),
        })
    }

    /// A node's record plus what an implementer needs around it: the
    /// dependencies it waits on (its own and its parent's) and the project
    /// configuration.
    pub fn node_context(&self, id: &str) -> Option<NodeContext> {
        let node = self.nodes.get(id)?;
        if id == self.root_id {
            return None;
        }

        let mut upstream: Vec<String> = node.dependencies().to_vec();
        if let Some(parent) = self.parent_of(id) {
            for dep in parent.dependencies() {
                if !upstream.contains(dep) {
                    upstream.push(dep.clone());
                }
            }
        }

        Some(NodeContext {
            target_node: self.module_record(id)?,
            upstream_dependencies: upstream,
            global_config: self
                .root()
                .and_then(|r| match &r.kind {
                    NodeKind::Root { config, .. } => Some(config.clone()),
                    _ => None,
                })
                .unwrap_or(serde_json::Value::Null),
        })
    }

    fn root_meta(&self) -> Option<&serde_json::Value> {
        match &self.root()?.kind {
            NodeKind::Root { meta, .. } => Some(meta),
            _ => None,
        }
    }

    // -----------------------------------------------------------------------
    // Document conversion
    // -----------------------------------------------------------------------

    /// Wire form of this tree.
    pub fn to_document(&self) -> SpecDocument {
        let root = self.root();
        let (meta, config) = match root.map(|r| &r.kind) {
            Some(NodeKind::Root { meta, config, .. }) => (meta.clone(), config.clone()),
            _ => (serde_json::Value::Null, serde_json::Value::Null),
        };
        SpecDocument {
            id: self.root_id.clone(),
            revision: self.revision,
            name: root.map(|r| r.name.clone()),
            status: root.map(|r| r.status).unwrap_or_default(),
            last_updated: root.and_then(|r| r.last_updated),
            meta,
            config,
            modules: root
                .map(|r| {
                    r.children()
                        .iter()
                        .filter_map(|c| self.module_record(c))
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    fn module_record(&self, id: &str) -> Option<ModuleRecord> {
        let node = self.nodes.get(id)?;
        match &node.kind {
            NodeKind::Root { .. } => None,
            NodeKind::Branch {
                description,
                dependencies,
                children,
            } => Some(ModuleRecord::Branch(BranchRecord {
                id: node.id.clone(),
                name: node.name.clone(),
                description: description.clone(),
                status: node.status,
                dependencies: dependencies.clone(),
                last_updated: node.last_updated,
                children: children
                    .iter()
                    .filter_map(|c| self.module_record(c))
                    .collect(),
            })),
            NodeKind::Leaf { dependencies, spec } => Some(ModuleRecord::Leaf(LeafRecord {
                id: node.id.clone(),
                name: node.name.clone(),
                status: node.status,
                dependencies: dependencies.clone(),
                last_updated: node.last_updated,
                spec: spec.clone(),
            })),
        }
    }

    /// Re-index a persisted document without recompiling the editor graph.
    ///
    /// Dependencies are re-checked and re-ordered; edges are not part of the
    /// document so no type check happens here.
    pub fn from_document(document: &SpecDocument) -> CompileResult<SpecTree> {
        let mut nodes: Vec<Node> = Vec::new();
        let mut parents: HashMap<String, String> = HashMap::new();

        nodes.push(Node {
            id: document.id.clone(),
            name: document.name.clone().unwrap_or_else(|| document.id.clone()),
            status: document.status,
            last_updated: document.last_updated,
            kind: NodeKind::Root {
                meta: document.meta.clone(),
                config: document.config.clone(),
                children: document.modules.iter().map(|m| m.id().to_string()).collect(),
            },
        });

        // (record, parent id)
        let mut stack: Vec<(&ModuleRecord, &str)> = document
            .modules
            .iter()
            .rev()
            .map(|m| (m, document.id.as_str()))
            .collect();
        while let Some((record, parent)) = stack.pop() {
            parents.insert(record.id().to_string(), parent.to_string());
            match record {
                ModuleRecord::Branch(b) => {
                    nodes.push(Node {
                        id: b.id.clone(),
                        name: b.name.clone(),
                        status: b.status,
                        last_updated: b.last_updated,
                        kind: NodeKind::Branch {
                            description: b.description.clone(),
                            dependencies: b.dependencies.clone(),
                            children: b.children.iter().map(|c| c.id().to_string()).collect(),
                        },
                    });
                    stack.extend(b.children.iter().rev().map(|c| (c, b.id.as_str())));
                }
                ModuleRecord::Leaf(l) => nodes.push(Node {
                    id: l.id.clone(),
                    name: l.name.clone(),
                    status: l.status,
                    last_updated: l.last_updated,
                    kind: NodeKind::Leaf {
                        dependencies: l.dependencies.clone(),
                        spec: l.spec.clone(),
                    },
                }),
            }
        }

        let index = index_ids(nodes.iter().map(|n| n.id.as_str()))?;
        check_dependencies(
            nodes.iter().map(|n| (n.id.as_str(), n.dependencies())),
            &index,
        )?;

        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        for (pos, node) in nodes.iter().enumerate() {
            for dep in node.dependencies() {
                adjacency[index[dep.as_str()]].push(pos);
            }
        }
        let order: Vec<String> = topological_order(&adjacency)
            .map_err(|stuck| CompileError::CycleDetected {
                nodes: stuck.into_iter().map(|i| nodes[i].id.clone()).collect(),
            })?
            .into_iter()
            .map(|i| nodes[i].id.clone())
            .collect();

        let mut tree = SpecTree::from_parts(
            document.id.clone(),
            nodes.into_iter().map(|n| (n.id.clone(), n)).collect(),
            parents,
            order,
        );
        tree.revision = document.revision;
        Ok(tree)
    }
}

// ---------------------------------------------------------------------------
// View types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeSummary {
    pub project_name: String,
    pub version: String,
    pub root_id: String,
    pub modules: Vec<OutlineEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlineEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub name: String,
    pub status: NodeState,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<OutlineEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeContext {
    pub target_node: ModuleRecord,
    pub upstream_dependencies: Vec<String>,
    pub global_config: serde_json::Value,
}
