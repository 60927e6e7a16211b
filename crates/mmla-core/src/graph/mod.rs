//! Architecture graph compilation.
//!
//! Turns an editor export (flat nodes with parent pointers plus typed
//! edges) into a validated, indexed [`SpecTree`]:
//!
//! - `model`: input descriptors and compiled node sum type
//! - `compiler`: indexing, Kahn ordering, edge type check, tree build
//! - `tree`: arena with parent index, summaries, document conversion
//! - `error`: `CompileError` taxonomy

pub mod compiler;
pub mod error;
pub mod model;
pub mod tree;

pub use compiler::compile;
pub use error::{CompileError, CompileResult, TypeMismatch};
pub use model::{
    EdgeData, EdgeDescriptor, FieldMapping, Node, NodeData, NodeDescriptor, NodeKind, NodeType,
    RawGraph,
};
pub use tree::{NodeContext, OutlineEntry, SpecTree, TreeSummary};
