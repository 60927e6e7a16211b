//! MMLA core library
//!
//! Compiles an architecture graph into a [`SpecTree`], drives each node
//! through the lifecycle [`StateMachine`], scores generated Python samples
//! with the seventeen-layer validator and runs bounded repair sessions
//! through the [`RetryOrchestrator`].

pub mod config;
pub mod fixer;
pub mod graph;
pub mod lifecycle;
pub mod metrics;
pub mod obs;
pub mod retry;
pub mod telemetry;
pub mod validator;

pub use config::{ConfigError, ConfigResult, MmlaConfig};
pub use fixer::{CodeFixer, FixerError, FixerResult, ProcessCodeFixer, RepairRequest};
pub use graph::{
    compile, CompileError, CompileResult, EdgeDescriptor, Node, NodeContext, NodeDescriptor,
    NodeKind, NodeType, RawGraph, SpecTree, TreeSummary, TypeMismatch,
};
pub use lifecycle::{LifecycleError, LifecycleResult, StateMachine};
pub use retry::{
    AttemptRecord, RetryOrchestrator, RetrySessionResult, SessionOutcome, SessionProgress,
    SessionStage,
};
pub use validator::{
    validate, LayerResult, LayeredValidator, SampleValidator, ValidationReport, LAYER_COUNT,
};

pub use mmla_state::{LeafSpec, NodeState};

pub use metrics::METRICS;
pub use telemetry::init_tracing;

/// MMLA version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
