//! Wire schema of the persisted specification document.
//!
//! The document is a root object (`id`, `revision`, `meta`, `config`) with a
//! recursive `modules` array. Every module is either a `BRANCH` (grouping
//! node with children) or a `LEAF` (a unit of work carrying an interface
//! spec).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeState {
    /// Upstream dependencies not yet implemented.
    #[default]
    Locked,
    Idle,
    Planning,
    Coding,
    Validating,
    /// Stable; may be reopened through `Refactor`.
    Implemented,
    Refactor,
}

impl NodeState {
    pub const ALL: [NodeState; 7] = [
        NodeState::Locked,
        NodeState::Idle,
        NodeState::Planning,
        NodeState::Coding,
        NodeState::Validating,
        NodeState::Implemented,
        NodeState::Refactor,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Locked => "LOCKED",
            Self::Idle => "IDLE",
            Self::Planning => "PLANNING",
            Self::Coding => "CODING",
            Self::Validating => "VALIDATING",
            Self::Implemented => "IMPLEMENTED",
            Self::Refactor => "REFACTOR",
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown node state: {0}")]
pub struct ParseNodeStateError(pub String);

impl FromStr for NodeState {
    type Err = ParseNodeStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        NodeState::ALL
            .into_iter()
            .find(|state| state.as_str() == wanted)
            .ok_or_else(|| ParseNodeStateError(s.to_string()))
    }
}

/// A named, typed interface field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
        }
    }
}

/// Declared output of a leaf: a single unnamed `{type}` or a list of named fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputSpec {
    Fields(Vec<FieldSpec>),
    Single {
        #[serde(rename = "type")]
        ty: String,
    },
}

impl Default for OutputSpec {
    fn default() -> Self {
        OutputSpec::Fields(Vec::new())
    }
}

impl OutputSpec {
    /// `true` when the leaf promises to return something.
    pub fn is_declared(&self) -> bool {
        match self {
            OutputSpec::Fields(fields) => !fields.is_empty(),
            OutputSpec::Single { .. } => true,
        }
    }

    /// Type of the named output field. A single unnamed output has no fields.
    pub fn field_type(&self, name: &str) -> Option<&str> {
        match self {
            OutputSpec::Fields(fields) => fields
                .iter()
                .find(|f| f.name == name)
                .map(|f| f.ty.as_str()),
            OutputSpec::Single { .. } => None,
        }
    }
}

/// Interface contract a leaf implementation must satisfy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafSpec {
    #[serde(default)]
    pub inputs: Vec<FieldSpec>,
    #[serde(default)]
    pub outputs: OutputSpec,
    #[serde(default)]
    pub constraints: Vec<String>,
    /// Third-party modules the implementation may import. Standard library
    /// modules are always permitted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_imports: Vec<String>,
}

impl LeafSpec {
    pub fn input_type(&self, name: &str) -> Option<&str> {
        self.inputs
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.ty.as_str())
    }

    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().map(|f| f.name.as_str())
    }
}

/// Root of the persisted specification document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecDocument {
    pub id: String,
    /// Incremented by the store on every successful write.
    #[serde(default)]
    pub revision: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: NodeState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub meta: serde_json::Value,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub modules: Vec<ModuleRecord>,
}

/// A non-root module in the document tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModuleRecord {
    Branch(BranchRecord),
    Leaf(LeafRecord),
}

impl ModuleRecord {
    pub fn id(&self) -> &str {
        match self {
            ModuleRecord::Branch(b) => &b.id,
            ModuleRecord::Leaf(l) => &l.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: NodeState,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub children: Vec<ModuleRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: NodeState,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub spec: LeafSpec,
}
