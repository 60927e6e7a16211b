//! Bounded validate/repair sessions.
//!
//! A session moves the node to `VALIDATING`, then for each attempt checks
//! for cancellation, validates the current code and, on failure, asks the
//! [`CodeFixer`](crate::fixer::CodeFixer) for a revision under a timeout.
//! It ends in `IMPLEMENTED` on a pass and back in `CODING` otherwise.

pub mod orchestrator;
pub mod session;

pub use orchestrator::{RetryOrchestrator, DEFAULT_FIXER_TIMEOUT};
pub use session::{AttemptRecord, RetrySessionResult, SessionOutcome, SessionProgress, SessionStage};
