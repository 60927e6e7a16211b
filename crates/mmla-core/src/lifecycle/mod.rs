//! Node lifecycle: the transition table and the store-backed state machine.
//!
//! ```text
//! LOCKED      -> IDLE                      (gated on dependencies)
//! IDLE        -> PLANNING
//! PLANNING    -> CODING
//! CODING      -> VALIDATING
//! VALIDATING  -> IMPLEMENTED | CODING | PLANNING
//! IMPLEMENTED -> REFACTOR
//! REFACTOR    -> PLANNING | CODING
//! *           -> itself (no-op) | LOCKED (reset)
//! ```
//!
//! Dependency gating is evaluated only on `LOCKED -> IDLE`; a dependency
//! that later regresses does not re-lock dependents already unlocked.

pub mod error;
pub mod machine;
pub mod table;

pub use error::{LifecycleError, LifecycleResult};
pub use machine::StateMachine;
pub use table::{allowed_targets, is_gated, is_legal_transition};
