//! Records produced by a repair session.

use serde::{Deserialize, Serialize};

/// One validate/repair iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt_number: u32,
    pub quality_score: u8,
    pub passed: bool,
    /// The report's suggestions for this attempt.
    pub failed_layer_summaries: Vec<String>,
    /// Set when the fixer failed or timed out; the code was kept as is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixer_error: Option<String>,
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionOutcome {
    Passed,
    Exhausted,
    Cancelled,
    /// The node could not be moved to `VALIDATING`; no attempt was made.
    PreconditionFailed { reason: String },
}

impl SessionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionOutcome::Passed => "passed",
            SessionOutcome::Exhausted => "exhausted",
            SessionOutcome::Cancelled => "cancelled",
            SessionOutcome::PreconditionFailed { .. } => "precondition_failed",
        }
    }
}

/// Final result of `run_retry_session`. Always complete, whatever happened
/// along the way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySessionResult {
    pub session_id: String,
    pub node_id: String,
    pub total_attempts: u32,
    pub history: Vec<AttemptRecord>,
    pub final_code: String,
    pub passed: bool,
    pub max_retries_reached: bool,
    pub outcome: SessionOutcome,
}

/// Phase of an attempt reported through the progress channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStage {
    Validating,
    Repairing,
    Finished,
}

/// Progress notification for callers that want to follow a session live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProgress {
    pub attempt: u32,
    pub total: u32,
    pub stage: SessionStage,
    pub message: String,
}
