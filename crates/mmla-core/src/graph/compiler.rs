//! Graph compilation: editor graph in, indexed [`SpecTree`] out.
//!
//! Validation runs in a fixed order so that an acyclic but mistyped graph
//! still reports every mismatch at once:
//!
//! 1. structural indexing (duplicate ids, dangling or self dependencies)
//! 2. cycle check (Kahn's algorithm over edges plus declared dependencies)
//! 3. edge type check (all mismatches collected)
//! 4. tree materialization (single root, valid parents, full reachability)

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::graph::error::{CompileError, CompileResult, TypeMismatch};
use crate::graph::model::{EdgeDescriptor, Node, NodeDescriptor, NodeKind, NodeType, RawGraph};
use crate::graph::tree::SpecTree;

impl RawGraph {
    /// Compile this graph. See [`compile`].
    pub fn compile(&self) -> CompileResult<SpecTree> {
        compile(&self.nodes, &self.edges)
    }
}

/// Compile nodes and edges into a [`SpecTree`].
///
/// Every declared dependency `d` of node `n` contributes an implicit edge
/// `d -> n`, so the resulting topological order always places a node after
/// everything it depends on.
pub fn compile(nodes: &[NodeDescriptor], edges: &[EdgeDescriptor]) -> CompileResult<SpecTree> {
    // 1. index
    let index = index_ids(nodes.iter().map(|n| n.id.as_str()))?;
    check_dependencies(
        nodes.iter().map(|n| (n.id.as_str(), n.declared_dependencies())),
        &index,
    )?;

    // 2. order
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for edge in edges {
        if let (Some(&src), Some(&dst)) = (
            index.get(edge.source_node_id.as_str()),
            index.get(edge.target_node_id.as_str()),
        ) {
            adjacency[src].push(dst);
        }
    }
    for (pos, node) in nodes.iter().enumerate() {
        for dep in node.declared_dependencies() {
            adjacency[index[dep.as_str()]].push(pos);
        }
    }
    let order = topological_order(&adjacency).map_err(|stuck| CompileError::CycleDetected {
        nodes: stuck.into_iter().map(|i| nodes[i].id.clone()).collect(),
    })?;

    // 3. types
    let mismatches = edge_type_mismatches(nodes, edges, &index);
    if !mismatches.is_empty() {
        return Err(CompileError::TypeMismatch(mismatches));
    }

    // 4. tree
    let tree = materialize(nodes, &index, order.iter().map(|&i| nodes[i].id.clone()).collect())?;
    debug!(
        root = %tree.root_id(),
        nodes = tree.len(),
        edges = edges.len(),
        "graph compiled"
    );
    Ok(tree)
}

// ---------------------------------------------------------------------------
// Shared helpers (also used when re-indexing a persisted document)
// ---------------------------------------------------------------------------

/// Position of every id, rejecting duplicates.
pub(crate) fn index_ids<'a>(
    ids: impl Iterator<Item = &'a str>,
) -> CompileResult<HashMap<&'a str, usize>> {
    let mut index = HashMap::new();
    for (pos, id) in ids.enumerate() {
        if index.insert(id, pos).is_some() {
            return Err(CompileError::DuplicateNode { id: id.to_string() });
        }
    }
    Ok(index)
}

/// Every dependency must name another existing node.
pub(crate) fn check_dependencies<'a>(
    nodes: impl Iterator<Item = (&'a str, &'a [String])>,
    index: &HashMap<&str, usize>,
) -> CompileResult<()> {
    for (id, deps) in nodes {
        for dep in deps {
            if dep == id {
                return Err(CompileError::SelfDependency {
                    node: id.to_string(),
                });
            }
            if !index.contains_key(dep.as_str()) {
                return Err(CompileError::UnknownDependency {
                    node: id.to_string(),
                    dependency: dep.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Kahn's algorithm over positions `0..adjacency.len()`.
///
/// The queue is seeded in position order and drained FIFO, so the result is
/// deterministic for a given input. On a cycle, returns the positions that
/// were never emitted (ascending).
pub(crate) fn topological_order(adjacency: &[Vec<usize>]) -> Result<Vec<usize>, Vec<usize>> {
    let mut in_degree = vec![0usize; adjacency.len()];
    for targets in adjacency {
        for &t in targets {
            in_degree[t] += 1;
        }
    }

    let mut queue: VecDeque<usize> = (0..adjacency.len())
        .filter(|&i| in_degree[i] == 0)
        .collect();
    let mut sorted = Vec::with_capacity(adjacency.len());

    while let Some(pos) = queue.pop_front() {
        sorted.push(pos);
        for &next in &adjacency[pos] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    if sorted.len() != adjacency.len() {
        let stuck = (0..adjacency.len()).filter(|&i| in_degree[i] > 0).collect();
        return Err(stuck);
    }
    Ok(sorted)
}

// ---------------------------------------------------------------------------
// Type check
// ---------------------------------------------------------------------------

fn edge_type_mismatches(
    nodes: &[NodeDescriptor],
    edges: &[EdgeDescriptor],
    index: &HashMap<&str, usize>,
) -> Vec<TypeMismatch> {
    let mut mismatches = Vec::new();

    for edge in edges {
        let Some(mapping) = edge.field_mapping() else {
            continue;
        };
        let (Some(&src), Some(&dst)) = (
            index.get(edge.source_node_id.as_str()),
            index.get(edge.target_node_id.as_str()),
        ) else {
            continue;
        };
        let (source, target) = (&nodes[src], &nodes[dst]);
        if source.kind != NodeType::Leaf || target.kind != NodeType::Leaf {
            continue;
        }

        let source_type = source
            .data
            .spec
            .as_ref()
            .and_then(|s| s.outputs.field_type(&mapping.source_field));
        let target_type = target
            .data
            .spec
            .as_ref()
            .and_then(|s| s.input_type(&mapping.target_field));

        if let (Some(st), Some(tt)) = (source_type, target_type) {
            if st != tt {
                mismatches.push(TypeMismatch {
                    edge_id: edge.id.clone(),
                    source_node_id: source.id.clone(),
                    source_field: mapping.source_field.clone(),
                    source_type: st.to_string(),
                    target_node_id: target.id.clone(),
                    target_field: mapping.target_field.clone(),
                    target_type: tt.to_string(),
                });
            }
        }
    }

    mismatches
}

// ---------------------------------------------------------------------------
// Tree materialization
// ---------------------------------------------------------------------------

fn materialize(
    nodes: &[NodeDescriptor],
    index: &HashMap<&str, usize>,
    order: Vec<String>,
) -> CompileResult<SpecTree> {
    let roots: Vec<&NodeDescriptor> = nodes.iter().filter(|n| n.kind == NodeType::Root).collect();
    let root = match roots.as_slice() {
        [] => return Err(CompileError::NoRoot),
        [root] => *root,
        many => {
            return Err(CompileError::MultipleRoots {
                roots: many.iter().map(|n| n.id.clone()).collect(),
            })
        }
    };

    let mut parents: HashMap<String, String> = HashMap::new();
    for node in nodes {
        match (node.kind, node.parent.as_deref()) {
            (NodeType::Root, None) => {}
            (NodeType::Root, Some(parent)) => {
                return Err(CompileError::InvalidParent {
                    node: node.id.clone(),
                    parent: parent.to_string(),
                    reason: "the root cannot have a parent".to_string(),
                })
            }
            (_, None) => {
                return Err(CompileError::OrphanNode {
                    node: node.id.clone(),
                })
            }
            (_, Some(parent)) => {
                let Some(&pos) = index.get(parent) else {
                    return Err(CompileError::UnknownParent {
                        node: node.id.clone(),
                        parent: parent.to_string(),
                    });
                };
                if nodes[pos].kind == NodeType::Leaf {
                    return Err(CompileError::InvalidParent {
                        node: node.id.clone(),
                        parent: parent.to_string(),
                        reason: "leaves cannot have children".to_string(),
                    });
                }
                parents.insert(node.id.clone(), parent.to_string());
            }
        }
    }

    let mut arena: HashMap<String, Node> = nodes
        .iter()
        .map(|d| (d.id.clone(), build_node(d)))
        .collect();
    for node in nodes {
        if let Some(parent) = parents.get(&node.id) {
            if let Some(children) = arena.get_mut(parent).and_then(Node::children_mut) {
                children.push(node.id.clone());
            }
        }
    }

    // Parent chains that loop among themselves never reach the root.
    let mut reached = std::collections::HashSet::new();
    let mut stack = vec![root.id.as_str()];
    while let Some(id) = stack.pop() {
        if reached.insert(id) {
            if let Some(node) = arena.get(id) {
                stack.extend(node.children().iter().map(String::as_str));
            }
        }
    }
    if let Some(orphan) = nodes.iter().find(|n| !reached.contains(n.id.as_str())) {
        return Err(CompileError::OrphanNode {
            node: orphan.id.clone(),
        });
    }

    Ok(SpecTree::from_parts(root.id.clone(), arena, parents, order))
}

fn build_node(desc: &NodeDescriptor) -> Node {
    let data = &desc.data;
    let kind = match desc.kind {
        NodeType::Root => NodeKind::Root {
            meta: data.meta.clone(),
            config: data.config.clone(),
            children: Vec::new(),
        },
        NodeType::Branch => NodeKind::Branch {
            description: data.description.clone(),
            dependencies: data.dependencies.clone(),
            children: Vec::new(),
        },
        NodeType::Leaf => NodeKind::Leaf {
            dependencies: data.dependencies.clone(),
            spec: data.spec.clone().unwrap_or_default(),
        },
    };
    Node {
        id: desc.id.clone(),
        name: data.name.clone().unwrap_or_else(|| desc.id.clone()),
        status: data.status.unwrap_or_default(),
        last_updated: None,
        kind,
    }
}
