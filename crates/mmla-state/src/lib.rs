//! MMLA-State: specification document persistence
//!
//! This crate owns all I/O for the architecture lifecycle: the persisted
//! specification document (the compiled node tree with statuses) and the
//! audit trail of failed validation attempts.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: document integrity and lost-update protection. Every status change
//! is a whole-document read-modify-write, so stores expose an optimistic
//! compare-and-swap keyed on the document `revision`.
//!
//! ## Key Components
//!
//! - `SpecStore`: versioned whole-document storage
//! - `JsonFileSpecStore`: atomic single-file JSON backend, `flock`-serialized
//! - `AuditTrail` / `JsonlAuditTrail`: append-only failed-attempt log
//! - `SpecDocument`: wire schema of the compiled tree

mod error;
pub mod fakes;
mod file_store;
pub mod schema;
pub mod storage_traits;

pub use error::StorageError;
pub use file_store::{JsonFileSpecStore, JsonlAuditTrail};
pub use schema::{
    BranchRecord, FieldSpec, LeafRecord, LeafSpec, ModuleRecord, NodeState, OutputSpec,
    ParseNodeStateError, SpecDocument,
};
pub use storage_traits::{
    AuditEntry, AuditTrail, ContentDigest, SpecStore, StorageResult, MAX_UPDATE_BACKOFF,
};
